//! Artifact collection, diagnostic filtering, and reconciliation.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use thiserror::Error;
use weft_diagnostics::{Diagnostic, DiagnosticSink, Severity, SeverityCounts};

use crate::error::TransformError;
use crate::value::NodeId;

/// A generated output file.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Artifact {
    pub name: String,
    pub content: String,
    /// The output node that emitted it.
    pub origin: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("artifact `{name}` already emitted by {first}")]
    DuplicateName {
        name: String,
        first: NodeId,
        second: NodeId,
    },

    #[error("invalid artifact name `{name}`: {reason}")]
    InvalidName {
        name: String,
        node: NodeId,
        reason: &'static str,
    },
}

/// Why an output action stopped.
#[derive(Debug, Error)]
pub enum EmitError {
    /// The sink refused an artifact. Fatal for the pass.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// The action failed for this item only.
    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Checks that `name` is a plain relative file name.
pub fn validate_artifact_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("name is empty");
    }
    if name.trim() != name {
        return Err("name has leading or trailing whitespace");
    }
    if name.contains('/') || name.contains('\\') {
        return Err("name contains a path separator");
    }
    if name.contains("..") {
        return Err("name contains `..`");
    }
    Ok(())
}

/// Which diagnostic ids are dropped or promoted to errors.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticPolicy {
    allow: HashSet<String>,
    deny: HashSet<String>,
}

impl DiagnosticPolicy {
    pub fn new(
        allow: impl IntoIterator<Item = String>,
        deny: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            allow: allow.into_iter().collect(),
            deny: deny.into_iter().collect(),
        }
    }

    /// Applies the policy; `None` means the diagnostic is suppressed.
    pub fn apply(&self, mut diag: Diagnostic) -> Option<Diagnostic> {
        if self.allow.contains(diag.id.as_str()) {
            return None;
        }
        if self.deny.contains(diag.id.as_str()) {
            diag.severity = Severity::Error;
        }
        Some(diag)
    }
}

/// Collects artifacts and diagnostics for one pass.
///
/// Shared between output nodes evaluated in parallel. Names are claimed on
/// `add_artifact`, so a second claimant is rejected immediately.
pub struct OutputSink {
    artifacts: Mutex<BTreeMap<String, Artifact>>,
    fatal: Mutex<Option<SinkError>>,
    diagnostics: DiagnosticSink,
    policy: DiagnosticPolicy,
}

impl OutputSink {
    pub fn new(policy: DiagnosticPolicy) -> Self {
        Self {
            artifacts: Mutex::new(BTreeMap::new()),
            fatal: Mutex::new(None),
            diagnostics: DiagnosticSink::new(),
            policy,
        }
    }

    pub fn add_artifact(&self, artifact: Artifact) -> Result<(), SinkError> {
        let checked = match validate_artifact_name(&artifact.name) {
            Err(reason) => Err(SinkError::InvalidName {
                name: artifact.name.clone(),
                node: artifact.origin,
                reason,
            }),
            Ok(()) => {
                let mut artifacts = self.artifacts.lock().unwrap_or_else(|e| e.into_inner());
                match artifacts.get(&artifact.name) {
                    Some(existing) => Err(SinkError::DuplicateName {
                        name: artifact.name.clone(),
                        first: existing.origin,
                        second: artifact.origin,
                    }),
                    None => {
                        artifacts.insert(artifact.name.clone(), artifact);
                        Ok(())
                    }
                }
            }
        };
        if let Err(err) = &checked {
            self.record_fatal(err.clone());
        }
        checked
    }

    pub fn add_diagnostic(&self, diag: Diagnostic) {
        if let Some(diag) = self.policy.apply(diag) {
            self.diagnostics.emit(diag);
        }
    }

    /// Releases names claimed by an output item that later failed.
    pub(crate) fn withdraw(&self, names: &[String]) {
        let mut artifacts = self.artifacts.lock().unwrap_or_else(|e| e.into_inner());
        for name in names {
            artifacts.remove(name);
        }
    }

    /// The first refused artifact of the pass, if any.
    pub fn fatal_error(&self) -> Option<SinkError> {
        self.fatal.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record_fatal(&self, err: SinkError) {
        let mut fatal = self.fatal.lock().unwrap_or_else(|e| e.into_inner());
        if fatal.is_none() {
            *fatal = Some(err);
        }
    }

    /// Totals of the diagnostics kept so far, after policy filtering.
    pub fn diagnostic_counts(&self) -> SeverityCounts {
        self.diagnostics.counts()
    }

    pub fn artifact_count(&self) -> usize {
        self.artifacts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn into_parts(self) -> (BTreeMap<String, Artifact>, Vec<Diagnostic>) {
        let diagnostics = self.diagnostics.take_all();
        let artifacts = self.artifacts.into_inner().unwrap_or_else(|e| e.into_inner());
        (artifacts, diagnostics)
    }
}

/// Everything one output item emitted, cached for replay.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Emissions {
    pub artifacts: Vec<(String, String)>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Handed to output actions. Records emissions for replay on later passes.
pub struct OutputContext<'a> {
    sink: &'a OutputSink,
    node: NodeId,
    emissions: Emissions,
}

impl<'a> OutputContext<'a> {
    pub(crate) fn new(sink: &'a OutputSink, node: NodeId) -> Self {
        Self {
            sink,
            node,
            emissions: Emissions::default(),
        }
    }

    /// Emits an artifact. Duplicate or invalid names abort the pass even if
    /// the error is ignored here.
    pub fn add_artifact(
        &mut self,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<(), SinkError> {
        let artifact = Artifact {
            name: name.into(),
            content: content.into(),
            origin: self.node,
        };
        let record = (artifact.name.clone(), artifact.content.clone());
        self.sink.add_artifact(artifact)?;
        self.emissions.artifacts.push(record);
        Ok(())
    }

    /// Reports a diagnostic. Always succeeds.
    pub fn report(&mut self, diag: Diagnostic) {
        self.emissions.diagnostics.push(diag);
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub(crate) fn into_emissions(self) -> Emissions {
        self.emissions
    }

    /// Releases the artifacts of a failed item, keeping what it reported.
    pub(crate) fn abandon(self) -> Vec<Diagnostic> {
        let names: Vec<String> = self
            .emissions
            .artifacts
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        self.sink.withdraw(&names);
        self.emissions.diagnostics
    }
}

/// The difference between two committed artifact sets.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArtifactChanges {
    pub added: Vec<Artifact>,
    pub removed: Vec<String>,
    pub updated: Vec<Artifact>,
    pub unchanged: usize,
}

impl ArtifactChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

/// Compares artifact sets by name and content. Results are sorted by name.
pub fn reconcile(
    previous: &BTreeMap<String, Artifact>,
    current: &BTreeMap<String, Artifact>,
) -> ArtifactChanges {
    let mut changes = ArtifactChanges::default();
    for (name, artifact) in current {
        match previous.get(name) {
            None => changes.added.push(artifact.clone()),
            Some(old) if old.content != artifact.content => changes.updated.push(artifact.clone()),
            Some(_) => changes.unchanged += 1,
        }
    }
    changes.removed = previous
        .keys()
        .filter(|name| !current.contains_key(*name))
        .cloned()
        .collect();
    changes
}

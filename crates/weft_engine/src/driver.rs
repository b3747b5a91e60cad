//! Pass scheduling, commit, and reconciliation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use tracing::{debug, info, warn};
use weft_common::{InternalError, WeftResult};
use weft_config::{CacheConfig, DriverConfig, WeftConfig};
use weft_diagnostics::Diagnostic;

use crate::cache::NodeCache;
use crate::cancel::CancellationToken;
use crate::error::PassError;
use crate::input::{InputSnapshot, SnapshotDiff};
use crate::operator::{EvalContext, NodeOutput, NodeResult};
use crate::output::{reconcile, Artifact, DiagnosticPolicy, OutputSink};
use crate::pipeline::{Pipeline, Provider};
use crate::value::{NodeId, Value, ValueNode};

/// Lifecycle of a pass: `Idle -> Evaluating -> (Committed | Failed) -> Idle`.
///
/// `Committed` and `Failed` are transient; [`Driver::phase`] reports `Idle`
/// between passes and [`Driver::last_outcome`] keeps how the last one ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Evaluating,
    Committed,
    Failed,
}

/// Counters describing one committed pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassStats {
    pub generation: u64,
    pub inputs_added: usize,
    pub inputs_removed: usize,
    pub inputs_modified: usize,
    pub inputs_unchanged: usize,
    /// Items whose transformation or action was run.
    pub recomputed: usize,
    /// Items taken from the cache without running user code.
    pub reused: usize,
    /// Cache entries from the previous pass that were not reached.
    pub evicted: usize,
    pub artifacts: usize,
}

/// What a committed pass changed, relative to the previous committed pass.
#[derive(Clone, Debug)]
pub struct EvaluationResult {
    pub generation: u64,
    pub artifacts_added: Vec<Artifact>,
    pub artifacts_removed: Vec<String>,
    pub artifacts_updated: Vec<Artifact>,
    /// Every diagnostic of the pass, including replayed ones, in node order.
    pub diagnostics: Vec<Diagnostic>,
    pub stats: PassStats,
}

impl EvaluationResult {
    /// No artifact was added, removed, or updated.
    pub fn is_unchanged(&self) -> bool {
        self.artifacts_added.is_empty()
            && self.artifacts_removed.is_empty()
            && self.artifacts_updated.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity.is_error())
    }
}

#[derive(Default)]
pub(crate) struct CommittedState {
    pub generation: u64,
    pub cache: NodeCache,
    pub snapshot: Option<InputSnapshot>,
    pub artifacts: BTreeMap<String, Artifact>,
}

struct PassOutput {
    cache: NodeCache,
    artifacts: BTreeMap<String, Artifact>,
    diagnostics: Vec<Diagnostic>,
    reused: usize,
    recomputed: usize,
}

/// Runs passes of a [`Pipeline`] against successive input snapshots.
///
/// Passes are exclusive: a second `evaluate` blocks until the running one
/// has committed or failed. Readers of the committed state never wait for a
/// pass; they see the last commit until the next one is swapped in.
pub struct Driver {
    pipeline: Pipeline,
    options: DriverConfig,
    cache_config: CacheConfig,
    policy: DiagnosticPolicy,
    pool: Option<rayon::ThreadPool>,
    pass: Mutex<()>,
    state: Mutex<Arc<CommittedState>>,
    phase: Mutex<Phase>,
    last_outcome: Mutex<Option<Phase>>,
    last_stats: Mutex<Option<PassStats>>,
}

impl Driver {
    pub fn new(pipeline: Pipeline, config: &WeftConfig) -> WeftResult<Self> {
        let pool = if config.driver.threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.driver.threads)
                .thread_name(|i| format!("weft-worker-{i}"))
                .build()
                .map_err(|e| InternalError::new(format!("failed to start worker pool: {e}")))?;
            Some(pool)
        } else {
            None
        };
        Ok(Self {
            pipeline,
            options: config.driver.clone(),
            cache_config: config.cache.clone(),
            policy: DiagnosticPolicy::new(
                config.diagnostics.allow.iter().cloned(),
                config.diagnostics.deny.iter().cloned(),
            ),
            pool,
            pass: Mutex::new(()),
            state: Mutex::new(Arc::new(CommittedState::default())),
            phase: Mutex::new(Phase::Idle),
            last_outcome: Mutex::new(None),
            last_stats: Mutex::new(None),
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of committed passes.
    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    /// The committed artifacts, sorted by name.
    pub fn artifacts(&self) -> Vec<Artifact> {
        self.state().artifacts.values().cloned().collect()
    }

    pub fn artifact(&self, name: &str) -> Option<Artifact> {
        self.state().artifacts.get(name).cloned()
    }

    /// `Committed` or `Failed` for the last finished pass, `None` before the
    /// first one.
    pub fn last_outcome(&self) -> Option<Phase> {
        *self.last_outcome.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn last_stats(&self) -> Option<PassStats> {
        self.last_stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Where committed state is written when `cache.persist` is set.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_config.dir
    }

    /// The committed values of a provider's node, ordered by item key.
    pub fn values<T: Value>(&self, provider: &Provider<T>) -> Result<Vec<ValueNode<T>>, PassError> {
        let node = provider.node();
        self.state()
            .cache
            .entries_of(node)
            .into_iter()
            .map(|(key, entry)| ValueNode::from_erased(node, key, entry.fingerprint, &entry.value))
            .collect()
    }

    /// Number of entries in the committed cache.
    pub fn cached_entries(&self) -> usize {
        self.state().cache.len()
    }

    /// The last committed state. Held only as long as the caller keeps it.
    pub(crate) fn state(&self) -> Arc<CommittedState> {
        Arc::clone(&self.state.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub(crate) fn replace_state(&self, next: Arc<CommittedState>) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    /// Records how a pass ended and returns to `Idle`.
    fn finish(&self, outcome: Phase) {
        *self.last_outcome.lock().unwrap_or_else(|e| e.into_inner()) = Some(outcome);
        self.set_phase(Phase::Idle);
    }

    pub fn evaluate(&self, snapshot: InputSnapshot) -> Result<EvaluationResult, PassError> {
        self.evaluate_with(snapshot, &CancellationToken::new())
    }

    /// Runs one pass. On any error the committed state is left untouched.
    pub fn evaluate_with(
        &self,
        snapshot: InputSnapshot,
        cancel: &CancellationToken,
    ) -> Result<EvaluationResult, PassError> {
        let _pass = self.pass.lock().unwrap_or_else(|e| e.into_inner());
        self.set_phase(Phase::Evaluating);
        let previous = self.state();

        let generation = previous.generation + 1;
        let diff = snapshot.diff(previous.snapshot.as_ref());
        info!("Pass {} started: {}", generation, diff);

        let outcome = match &self.pool {
            Some(pool) => pool.install(|| self.run_pass(&previous, &snapshot, cancel)),
            None => self.run_pass(&previous, &snapshot, cancel),
        };
        let pass = match outcome {
            Ok(pass) => pass,
            Err(err) => {
                if err.is_cancelled() {
                    info!("Pass {} cancelled", generation);
                } else {
                    warn!("Pass {} aborted: {}", generation, err);
                }
                self.finish(Phase::Failed);
                return Err(err);
            }
        };

        let changes = reconcile(&previous.artifacts, &pass.artifacts);
        let stats = PassStats {
            generation,
            inputs_added: diff.added.len(),
            inputs_removed: diff.removed.len(),
            inputs_modified: diff.modified.len(),
            inputs_unchanged: diff.unchanged.len(),
            recomputed: pass.recomputed,
            reused: pass.reused,
            evicted: previous.cache.evicted_by(&pass.cache),
            artifacts: pass.artifacts.len(),
        };

        let next = Arc::new(CommittedState {
            generation,
            cache: pass.cache,
            snapshot: Some(snapshot),
            artifacts: pass.artifacts,
        });
        self.replace_state(Arc::clone(&next));

        info!(
            "Pass {} committed: {} added, {} removed, {} updated, {} unchanged ({} reused, {} recomputed, {} evicted)",
            generation,
            changes.added.len(),
            changes.removed.len(),
            changes.updated.len(),
            changes.unchanged,
            stats.reused,
            stats.recomputed,
            stats.evicted
        );

        if self.cache_config.persist {
            if let Err(err) = self.persist(&next) {
                warn!("Failed to persist pass {}: {}", generation, err);
            }
        }

        *self.last_stats.lock().unwrap_or_else(|e| e.into_inner()) = Some(stats.clone());
        self.finish(Phase::Committed);

        Ok(EvaluationResult {
            generation,
            artifacts_added: changes.added,
            artifacts_removed: changes.removed,
            artifacts_updated: changes.updated,
            diagnostics: pass.diagnostics,
            stats,
        })
    }

    fn run_pass(
        &self,
        state: &CommittedState,
        snapshot: &InputSnapshot,
        cancel: &CancellationToken,
    ) -> Result<PassOutput, PassError> {
        let sink = OutputSink::new(self.policy.clone());
        let mut overlay = NodeCache::default();
        let mut outputs: Vec<Option<NodeOutput>> =
            (0..self.pipeline.node_count()).map(|_| None).collect();
        let mut reused = 0;
        let mut recomputed = 0;

        for level in self.pipeline.levels() {
            cancel.check()?;
            let results: Vec<Result<NodeResult, PassError>> =
                if self.options.parallel && level.len() > 1 {
                    level
                        .par_iter()
                        .map(|&node| self.evaluate_node(node, &outputs, state, snapshot, &sink, cancel))
                        .collect()
                } else {
                    let mut results = Vec::with_capacity(level.len());
                    for &node in level {
                        let result = self.evaluate_node(node, &outputs, state, snapshot, &sink, cancel);
                        let failed = result.is_err();
                        results.push(result);
                        if failed {
                            break;
                        }
                    }
                    results
                };

            // Merge in node order so diagnostics do not depend on scheduling.
            for (&node, result) in level.iter().zip(results) {
                let result = result?;
                debug!(
                    "Evaluated {} `{}`: {} reused, {} recomputed",
                    node,
                    self.pipeline.spec(node).label,
                    result.reused,
                    result.recomputed
                );
                reused += result.reused;
                recomputed += result.recomputed;
                for diag in result.diagnostics {
                    sink.add_diagnostic(diag);
                }
                overlay.extend(node, result.entries);
                outputs[node.index()] = Some(result.output);
            }
        }

        if let Some(err) = sink.fatal_error() {
            return Err(err.into());
        }
        debug!(
            "{} artifacts, diagnostics: {}",
            sink.artifact_count(),
            sink.diagnostic_counts()
        );
        let (artifacts, diagnostics) = sink.into_parts();
        Ok(PassOutput {
            cache: overlay,
            artifacts,
            diagnostics,
            reused,
            recomputed,
        })
    }

    fn evaluate_node(
        &self,
        node: NodeId,
        outputs: &[Option<NodeOutput>],
        state: &CommittedState,
        snapshot: &InputSnapshot,
        sink: &OutputSink,
        cancel: &CancellationToken,
    ) -> Result<NodeResult, PassError> {
        cancel.check()?;
        let spec = self.pipeline.spec(node);
        let inputs = spec
            .inputs
            .iter()
            .map(|input| {
                outputs[input.index()].as_ref().ok_or_else(|| {
                    InternalError::new(format!("{node} scheduled before its input {input}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let cx = EvalContext {
            node,
            label: &spec.label,
            snapshot,
            inputs,
            previous: &state.cache,
            sink,
            cancel,
            parallel: self.options.parallel,
            verify_reuse: self.options.verify_reuse,
        };
        spec.op.evaluate(&cx)
    }

    /// Diff of `snapshot` against the last committed one.
    pub fn diff(&self, snapshot: &InputSnapshot) -> SnapshotDiff {
        snapshot.diff(self.state().snapshot.as_ref())
    }
}

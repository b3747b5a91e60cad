//! Host-supplied inputs: syntax fragments, additional texts, and build options.
//!
//! The engine never parses source text. Hosts hand it an [`InputSnapshot`]
//! of pre-extracted items for every pass; the snapshot is immutable and
//! compared structurally against the previous one.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use weft_common::{ContentHash, Fingerprint};
use weft_diagnostics::Location;

/// Values that carry a kind tag usable with [`Provider::where_kind`](crate::Provider::where_kind).
pub trait Tagged {
    fn tag(&self) -> &str;
}

/// The syntactic category of a fragment.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FragmentKind {
    Field,
    Method,
    Type,
    Other(String),
}

impl FragmentKind {
    pub fn as_str(&self) -> &str {
        match self {
            FragmentKind::Field => "field",
            FragmentKind::Method => "method",
            FragmentKind::Type => "type",
            FragmentKind::Other(tag) => tag,
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pre-extracted piece of host syntax, such as an attributed field.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyntaxFragment {
    /// Stable host-supplied identity. Survives edits to the fragment.
    pub id: String,
    pub kind: FragmentKind,
    /// Name of the attribute or marker that selected this fragment.
    pub marker: String,
    pub properties: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, String>,
    pub location: Option<Location>,
}

impl SyntaxFragment {
    pub fn new(id: impl Into<String>, kind: FragmentKind, marker: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            marker: marker.into(),
            properties: BTreeMap::new(),
            metadata: BTreeMap::new(),
            location: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn identity(&self) -> String {
        format!("fragment:{}", self.id)
    }
}

impl Tagged for SyntaxFragment {
    fn tag(&self) -> &str {
        self.kind.as_str()
    }
}

/// A non-source file handed to the pipeline, with its per-file metadata.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdditionalText {
    pub path: String,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
}

impl AdditionalText {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// File name without directories or extension.
    pub fn file_stem(&self) -> &str {
        Path::new(&self.path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }

    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.path).extension().and_then(|s| s.to_str())
    }

    pub fn identity(&self) -> String {
        format!("text:{}", self.path)
    }
}

/// The global build options visible to a pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildOptions {
    values: BTreeMap<String, String>,
}

impl BuildOptions {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Reads an option as a boolean; only a case-insensitive `true` is true.
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for BuildOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One host-supplied input.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputItem {
    Fragment(SyntaxFragment),
    Text(AdditionalText),
    Option { key: String, value: String },
}

impl InputItem {
    /// The part of the item that survives edits: `fragment:<id>`,
    /// `text:<path>` or `option:<key>`.
    pub fn identity(&self) -> String {
        match self {
            InputItem::Fragment(fragment) => fragment.identity(),
            InputItem::Text(text) => text.identity(),
            InputItem::Option { key, .. } => format!("option:{key}"),
        }
    }

    /// Structural digest of the whole item.
    pub fn fingerprint(&self) -> Fingerprint {
        ContentHash::of(self)
    }
}

impl Tagged for InputItem {
    fn tag(&self) -> &str {
        match self {
            InputItem::Fragment(_) => "fragment",
            InputItem::Text(_) => "text",
            InputItem::Option { .. } => "option",
        }
    }
}

impl From<SyntaxFragment> for InputItem {
    fn from(fragment: SyntaxFragment) -> Self {
        InputItem::Fragment(fragment)
    }
}

impl From<AdditionalText> for InputItem {
    fn from(text: AdditionalText) -> Self {
        InputItem::Text(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("duplicate input identity `{identity}`")]
    DuplicateIdentity { identity: String },
}

/// An immutable, ordered sequence of input items for one pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSnapshot {
    items: Vec<InputItem>,
}

impl InputSnapshot {
    /// Builds a snapshot, rejecting two items with the same identity.
    pub fn new(items: Vec<InputItem>) -> Result<Self, SnapshotError> {
        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            let identity = item.identity();
            if !seen.insert(identity.clone()) {
                return Err(SnapshotError::DuplicateIdentity { identity });
            }
        }
        Ok(Self { items })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::default()
    }

    pub fn items(&self) -> &[InputItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn fragments(&self) -> impl Iterator<Item = &SyntaxFragment> {
        self.items.iter().filter_map(|item| match item {
            InputItem::Fragment(fragment) => Some(fragment),
            _ => None,
        })
    }

    pub fn texts(&self) -> impl Iterator<Item = &AdditionalText> {
        self.items.iter().filter_map(|item| match item {
            InputItem::Text(text) => Some(text),
            _ => None,
        })
    }

    pub fn global_options(&self) -> BuildOptions {
        self.items
            .iter()
            .filter_map(|item| match item {
                InputItem::Option { key, value } => Some((key.as_str(), value.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Classifies every identity against `previous` by fingerprint.
    ///
    /// With no previous snapshot every item is added.
    pub fn diff(&self, previous: Option<&InputSnapshot>) -> SnapshotDiff {
        let before: HashMap<String, Fingerprint> = previous
            .map(|prev| {
                prev.items
                    .iter()
                    .map(|item| (item.identity(), item.fingerprint()))
                    .collect()
            })
            .unwrap_or_default();

        let mut diff = SnapshotDiff::default();
        let mut current = HashSet::with_capacity(self.items.len());
        for item in &self.items {
            let identity = item.identity();
            match before.get(&identity) {
                None => diff.added.push(identity.clone()),
                Some(fp) if *fp != item.fingerprint() => diff.modified.push(identity.clone()),
                Some(_) => diff.unchanged.push(identity.clone()),
            }
            current.insert(identity);
        }
        if let Some(prev) = previous {
            diff.removed = prev
                .items
                .iter()
                .map(InputItem::identity)
                .filter(|identity| !current.contains(identity))
                .collect();
        }
        diff
    }
}

/// Incremental construction of an [`InputSnapshot`].
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    items: Vec<InputItem>,
}

impl SnapshotBuilder {
    pub fn fragment(mut self, fragment: SyntaxFragment) -> Self {
        self.items.push(InputItem::Fragment(fragment));
        self
    }

    pub fn text(mut self, text: AdditionalText) -> Self {
        self.items.push(InputItem::Text(text));
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.items.push(InputItem::Option {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn build(self) -> Result<InputSnapshot, SnapshotError> {
        InputSnapshot::new(self.items)
    }
}

/// Per-identity classification of two snapshots. Identities keep snapshot order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
    pub unchanged: Vec<String>,
}

impl SnapshotDiff {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

impl fmt::Display for SnapshotDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} modified, {} unchanged",
            self.added.len(),
            self.removed.len(),
            self.modified.len(),
            self.unchanged.len()
        )
    }
}

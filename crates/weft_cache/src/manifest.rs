//! Cache manifest describing the last committed pass.
//!
//! The manifest is stored as `manifest.json` in the cache directory. It records
//! which artifacts were committed, where their contents live in the blob store,
//! and which pipeline produced them, so a restarted driver can tell whether
//! the stored state still applies.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use weft_common::ContentHash;

use crate::error::CacheError;

/// Name of the manifest file within the cache directory.
const MANIFEST_FILE: &str = "manifest.json";

/// Top-level manifest of persisted driver state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateManifest {
    /// Weft version that produced this state. Invalidate on version change.
    pub weft_version: String,

    /// Structural fingerprint of the pipeline graph that produced this state.
    pub pipeline: ContentHash,

    /// Generation number of the committed pass.
    pub generation: u64,

    /// Blob key of the encoded input snapshot, if one was stored.
    pub snapshot_key: Option<String>,

    /// Committed artifacts keyed by artifact name.
    pub artifacts: BTreeMap<String, ArtifactRecord>,
}

/// Persisted record of one committed artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Content hash of the artifact text.
    pub content_hash: ContentHash,

    /// Key of the artifact text in the blob store.
    pub blob_key: String,

    /// Raw id of the graph node that produced the artifact.
    pub origin: u32,
}

impl StateManifest {
    /// Creates a new, empty manifest.
    pub fn new(weft_version: &str, pipeline: ContentHash) -> Self {
        Self {
            weft_version: weft_version.to_string(),
            pipeline,
            generation: 0,
            snapshot_key: None,
            artifacts: BTreeMap::new(),
        }
    }

    /// Loads the manifest from the cache directory, returning `None` if
    /// the file doesn't exist or can't be parsed.
    pub fn load(cache_dir: &Path) -> Option<Self> {
        let path = cache_dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Saves the manifest to the cache directory.
    ///
    /// Creates the cache directory if it doesn't exist.
    pub fn save(&self, cache_dir: &Path) -> Result<(), CacheError> {
        std::fs::create_dir_all(cache_dir).map_err(|e| CacheError::io(&cache_dir, e))?;
        let path = cache_dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        std::fs::write(&path, json).map_err(|e| CacheError::io(&path, e))
    }

    /// Returns `true` if this manifest was written by the same Weft version
    /// for the same pipeline graph.
    pub fn is_compatible(&self, current_version: &str, pipeline: ContentHash) -> bool {
        self.weft_version == current_version && self.pipeline == pipeline
    }
}

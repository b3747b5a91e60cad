//! High-level persistence orchestrator.
//!
//! `StateStore` ties the manifest and the blob store together into a single
//! interface for the driver: record the committed artifacts and snapshot of
//! a pass, save them, and load them back on a cold restart.

use std::path::{Path, PathBuf};

use tracing::debug;
use weft_common::ContentHash;

use crate::blob::{BlobKind, BlobStore};
use crate::error::CacheError;
use crate::manifest::{ArtifactRecord, StateManifest};

/// One artifact read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Artifact name.
    pub name: String,
    /// Raw id of the producing graph node.
    pub origin: u32,
    /// Artifact text.
    pub content: String,
}

/// Persistence manager for committed driver state.
///
/// All reads are fail-safe: corruption, a version change, or a different
/// pipeline graph result in an empty state rather than an error.
pub struct StateStore {
    /// Root directory for all cache files.
    cache_dir: PathBuf,

    /// The manifest describing the stored state.
    manifest: StateManifest,

    /// Content-addressed blob storage.
    blobs: BlobStore,

    /// Weft version string for compatibility checks.
    weft_version: String,
}

impl StateStore {
    /// Loads existing state or starts an empty one.
    ///
    /// The stored manifest is used only if it was written by the same Weft
    /// version for a pipeline with the same fingerprint.
    pub fn load_or_create(cache_dir: &Path, weft_version: &str, pipeline: ContentHash) -> Self {
        let manifest = match StateManifest::load(cache_dir) {
            Some(m) if m.is_compatible(weft_version, pipeline) => m,
            Some(_) => {
                debug!(
                    "stored state in {} belongs to another version or pipeline; starting fresh",
                    cache_dir.display()
                );
                StateManifest::new(weft_version, pipeline)
            }
            None => StateManifest::new(weft_version, pipeline),
        };

        Self {
            cache_dir: cache_dir.to_path_buf(),
            manifest,
            blobs: BlobStore::new(cache_dir),
            weft_version: weft_version.to_string(),
        }
    }

    /// Returns a reference to the current manifest.
    pub fn manifest(&self) -> &StateManifest {
        &self.manifest
    }

    /// Returns the stored generation number.
    pub fn generation(&self) -> u64 {
        self.manifest.generation
    }

    /// Sets the generation number recorded in the manifest.
    pub fn set_generation(&mut self, generation: u64) {
        self.manifest.generation = generation;
    }

    /// Replaces the recorded artifact set with the given artifacts.
    ///
    /// Each item is `(name, origin, content)`.
    pub fn replace_artifacts<'a>(
        &mut self,
        artifacts: impl IntoIterator<Item = (&'a str, u32, &'a str)>,
    ) -> Result<(), CacheError> {
        self.manifest.artifacts.clear();
        for (name, origin, content) in artifacts {
            let blob_key = self
                .blobs
                .put(BlobKind::Artifact, content.as_bytes(), &self.weft_version)?;
            self.manifest.artifacts.insert(
                name.to_string(),
                ArtifactRecord {
                    content_hash: ContentHash::from_bytes(content.as_bytes()),
                    blob_key,
                    origin,
                },
            );
        }
        Ok(())
    }

    /// Reads back every recorded artifact.
    ///
    /// Returns `None` if any artifact cannot be read; a partial set would
    /// misreport what the previous pass produced.
    pub fn load_artifacts(&self) -> Option<Vec<StoredArtifact>> {
        let mut out = Vec::with_capacity(self.manifest.artifacts.len());
        for (name, record) in &self.manifest.artifacts {
            let bytes = self.blobs.get(BlobKind::Artifact, &record.blob_key)?;
            let content = String::from_utf8(bytes).ok()?;
            if ContentHash::from_bytes(content.as_bytes()) != record.content_hash {
                return None;
            }
            out.push(StoredArtifact {
                name: name.clone(),
                origin: record.origin,
                content,
            });
        }
        Some(out)
    }

    /// Stores an encoded input snapshot.
    pub fn store_snapshot(&mut self, bytes: &[u8]) -> Result<(), CacheError> {
        let key = self
            .blobs
            .put(BlobKind::Snapshot, bytes, &self.weft_version)?;
        self.manifest.snapshot_key = Some(key);
        Ok(())
    }

    /// Loads the encoded input snapshot, if one was stored and is intact.
    pub fn load_snapshot(&self) -> Option<Vec<u8>> {
        let key = self.manifest.snapshot_key.as_deref()?;
        self.blobs.get(BlobKind::Snapshot, key)
    }

    /// Persists the current manifest to disk.
    pub fn save(&self) -> Result<(), CacheError> {
        self.manifest.save(&self.cache_dir)
    }

    /// Removes blobs not referenced by the current manifest.
    ///
    /// Returns the number of files removed.
    pub fn gc(&self) -> Result<usize, CacheError> {
        let artifact_keys: Vec<&str> = self
            .manifest
            .artifacts
            .values()
            .map(|r| r.blob_key.as_str())
            .collect();
        let snapshot_keys: Vec<&str> = self.manifest.snapshot_key.as_deref().into_iter().collect();
        Ok(self.blobs.gc(BlobKind::Artifact, &artifact_keys)?
            + self.blobs.gc(BlobKind::Snapshot, &snapshot_keys)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> ContentHash {
        ContentHash::from_bytes(b"pipeline v1")
    }

    fn make_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load_or_create(dir.path(), "0.1.0", pipeline());
        (dir, store)
    }

    #[test]
    fn fresh_store_is_empty() {
        let (_dir, store) = make_store();
        assert!(store.manifest().artifacts.is_empty());
        assert_eq!(store.generation(), 0);
        assert!(store.load_snapshot().is_none());
        assert_eq!(store.load_artifacts().unwrap(), Vec::new());
    }

    #[test]
    fn artifacts_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = StateStore::load_or_create(dir.path(), "0.1.0", pipeline());
            store
                .replace_artifacts([("A.g.cs", 3, "class A {}"), ("B.g.cs", 4, "class B {}")])
                .unwrap();
            store.set_generation(2);
            store.save().unwrap();
        }

        let store = StateStore::load_or_create(dir.path(), "0.1.0", pipeline());
        assert_eq!(store.generation(), 2);
        let artifacts = store.load_artifacts().unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].name, "A.g.cs");
        assert_eq!(artifacts[0].origin, 3);
        assert_eq!(artifacts[1].content, "class B {}");
    }

    #[test]
    fn snapshot_roundtrip() {
        let (_dir, mut store) = make_store();
        store.store_snapshot(b"encoded snapshot").unwrap();
        assert_eq!(store.load_snapshot().unwrap(), b"encoded snapshot");
    }

    #[test]
    fn version_mismatch_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = StateStore::load_or_create(dir.path(), "0.1.0", pipeline());
            store.replace_artifacts([("A.g.cs", 0, "a")]).unwrap();
            store.save().unwrap();
        }
        let store = StateStore::load_or_create(dir.path(), "0.2.0", pipeline());
        assert!(store.manifest().artifacts.is_empty());
        assert_eq!(store.manifest().weft_version, "0.2.0");
    }

    #[test]
    fn pipeline_mismatch_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = StateStore::load_or_create(dir.path(), "0.1.0", pipeline());
            store.replace_artifacts([("A.g.cs", 0, "a")]).unwrap();
            store.save().unwrap();
        }
        let other = ContentHash::from_bytes(b"pipeline v2");
        let store = StateStore::load_or_create(dir.path(), "0.1.0", other);
        assert!(store.manifest().artifacts.is_empty());
    }

    #[test]
    fn missing_blob_fails_the_whole_set() {
        let (dir, mut store) = make_store();
        store.replace_artifacts([("A.g.cs", 0, "a")]).unwrap();
        std::fs::remove_dir_all(dir.path().join("artifacts")).unwrap();
        assert!(store.load_artifacts().is_none());
    }

    #[test]
    fn gc_removes_replaced_blobs() {
        let (_dir, mut store) = make_store();
        store.replace_artifacts([("A.g.cs", 0, "old")]).unwrap();
        store.store_snapshot(b"first").unwrap();
        store.replace_artifacts([("A.g.cs", 0, "new")]).unwrap();
        store.store_snapshot(b"second").unwrap();

        let removed = store.gc().unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.load_artifacts().unwrap()[0].content, "new");
        assert_eq!(store.load_snapshot().unwrap(), b"second");
    }
}

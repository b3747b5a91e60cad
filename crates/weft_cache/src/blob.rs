//! Content-addressed binary blob storage.
//!
//! Blobs (artifact contents, encoded input snapshots) are stored as binary
//! files in per-kind subdirectories of the cache. Each blob starts with a
//! header containing magic bytes, format version, and a payload checksum.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use weft_common::ContentHash;

use crate::error::CacheError;

/// Magic bytes identifying a Weft cache blob.
const BLOB_MAGIC: [u8; 4] = *b"WEFT";

/// Current blob format version. Increment on breaking changes to
/// the header or payload format.
const BLOB_FORMAT_VERSION: u32 = 1;

/// The kinds of blob the store knows how to place on disk.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlobKind {
    /// The text content of a generated artifact.
    Artifact,
    /// An encoded input snapshot.
    Snapshot,
}

impl BlobKind {
    fn subdir(self) -> &'static str {
        match self {
            BlobKind::Artifact => "artifacts",
            BlobKind::Snapshot => "snapshots",
        }
    }

    fn ext(self) -> &'static str {
        match self {
            BlobKind::Artifact => "art",
            BlobKind::Snapshot => "snap",
        }
    }
}

/// Header prepended to every stored blob for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlobHeader {
    magic: [u8; 4],
    format_version: u32,
    weft_version: String,
    checksum: ContentHash,
}

/// Content-addressed store for binary blobs.
///
/// Each blob is stored at `<cache_dir>/<subdir>/<hash>.<ext>`; identical
/// payloads share one file.
pub struct BlobStore {
    /// Root cache directory.
    cache_dir: PathBuf,
}

impl BlobStore {
    /// Creates a new blob store rooted at the given cache directory.
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    /// Returns the file path for a blob with the given key.
    pub fn blob_path(&self, kind: BlobKind, key: &str) -> PathBuf {
        self.cache_dir
            .join(kind.subdir())
            .join(format!("{key}.{}", kind.ext()))
    }

    /// Writes a blob and returns its key (the hex content hash of the payload).
    pub fn put(&self, kind: BlobKind, data: &[u8], weft_version: &str) -> Result<String, CacheError> {
        let dir = self.cache_dir.join(kind.subdir());
        std::fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;

        let checksum = ContentHash::from_bytes(data);
        let key = checksum.to_string();
        let path = self.blob_path(kind, &key);
        if path.exists() {
            return Ok(key);
        }

        let output = encode_blob(data, checksum, weft_version)?;
        std::fs::write(&path, &output).map_err(|e| CacheError::io(&path, e))?;
        Ok(key)
    }

    /// Reads a blob, validating its header and checksum.
    ///
    /// Returns `None` if the file is missing or fails validation. This is
    /// fail-safe: corruption results in a cache miss.
    pub fn get(&self, kind: BlobKind, key: &str) -> Option<Vec<u8>> {
        let path = self.blob_path(kind, key);
        let raw = std::fs::read(&path).ok()?;
        match decode_blob(&path, &raw) {
            Ok(payload) => Some(payload),
            Err(err) => {
                debug!("discarding cached blob: {err}");
                None
            }
        }
    }

    /// Removes blobs of the given kind whose key is not in `live_keys`.
    ///
    /// Returns the number of files removed.
    pub fn gc(&self, kind: BlobKind, live_keys: &[&str]) -> Result<usize, CacheError> {
        let dir = self.cache_dir.join(kind.subdir());
        if !dir.exists() {
            return Ok(0);
        }

        let entries = std::fs::read_dir(&dir).map_err(|e| CacheError::io(&dir, e))?;

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(kind.ext()) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !live_keys.contains(&stem) {
                std::fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

/// Layout: 4-byte header length (little-endian) + bincode header + payload.
fn encode_blob(data: &[u8], checksum: ContentHash, weft_version: &str) -> Result<Vec<u8>, CacheError> {
    let header = BlobHeader {
        magic: BLOB_MAGIC,
        format_version: BLOB_FORMAT_VERSION,
        weft_version: weft_version.to_string(),
        checksum,
    };
    let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
        .map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;

    let header_len = header_bytes.len() as u32;
    let mut output = Vec::with_capacity(4 + header_bytes.len() + data.len());
    output.extend_from_slice(&header_len.to_le_bytes());
    output.extend_from_slice(&header_bytes);
    output.extend_from_slice(data);
    Ok(output)
}

fn decode_blob(path: &Path, raw: &[u8]) -> Result<Vec<u8>, CacheError> {
    let invalid = |reason: &str| CacheError::InvalidHeader {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let len_bytes: [u8; 4] = raw
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| invalid("truncated header length"))?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let header_bytes = raw
        .get(4..4 + header_len)
        .ok_or_else(|| invalid("truncated header"))?;

    let (header, _): (BlobHeader, usize) =
        bincode::serde::decode_from_slice(header_bytes, bincode::config::standard())
            .map_err(|e| invalid(&e.to_string()))?;

    if header.magic != BLOB_MAGIC {
        return Err(invalid("missing magic bytes"));
    }
    if header.format_version != BLOB_FORMAT_VERSION {
        return Err(CacheError::VersionMismatch {
            path: path.to_path_buf(),
            expected: BLOB_FORMAT_VERSION,
            actual: header.format_version,
        });
    }

    let payload = &raw[4 + header_len..];
    let actual = ContentHash::from_bytes(payload);
    if actual != header.checksum {
        return Err(CacheError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: header.checksum.to_string(),
            actual: actual.to_string(),
        });
    }

    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        (dir, store)
    }

    fn craft(magic: [u8; 4], version: u32, checksum_of: &[u8], payload: &[u8]) -> Vec<u8> {
        let header = BlobHeader {
            magic,
            format_version: version,
            weft_version: "0.1.0".to_string(),
            checksum: ContentHash::from_bytes(checksum_of),
        };
        let header_bytes =
            bincode::serde::encode_to_vec(&header, bincode::config::standard()).unwrap();
        let mut output = Vec::new();
        output.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(payload);
        output
    }

    #[test]
    fn put_and_get_roundtrip() {
        let (_dir, store) = make_store();
        let data = b"public partial class UserClass {}";
        let key = store.put(BlobKind::Artifact, data, "0.1.0").unwrap();
        assert_eq!(store.get(BlobKind::Artifact, &key).unwrap(), data);
    }

    #[test]
    fn identical_payloads_share_a_key() {
        let (_dir, store) = make_store();
        let a = store.put(BlobKind::Artifact, b"same", "0.1.0").unwrap();
        let b = store.put(BlobKind::Artifact, b"same", "0.1.0").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn kinds_are_separate() {
        let (_dir, store) = make_store();
        let key = store.put(BlobKind::Snapshot, b"snap", "0.1.0").unwrap();
        assert!(store.get(BlobKind::Artifact, &key).is_none());
        assert!(store.get(BlobKind::Snapshot, &key).is_some());
    }

    #[test]
    fn get_missing_returns_none() {
        let (_dir, store) = make_store();
        assert!(store.get(BlobKind::Artifact, "nonexistent").is_none());
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_blob(Path::new("x.art"), b"garbage data").unwrap_err();
        assert!(matches!(err, CacheError::InvalidHeader { .. }));
    }

    #[test]
    fn decode_rejects_truncated_length() {
        let err = decode_blob(Path::new("x.art"), b"AB").unwrap_err();
        assert!(matches!(err, CacheError::InvalidHeader { .. }));
    }

    #[test]
    fn decode_rejects_wrong_magic() {
        let raw = craft(*b"BAAD", BLOB_FORMAT_VERSION, b"data", b"data");
        let err = decode_blob(Path::new("x.art"), &raw).unwrap_err();
        assert!(matches!(err, CacheError::InvalidHeader { .. }));
    }

    #[test]
    fn decode_rejects_wrong_version() {
        let raw = craft(BLOB_MAGIC, 999, b"data", b"data");
        let err = decode_blob(Path::new("x.art"), &raw).unwrap_err();
        assert!(matches!(
            err,
            CacheError::VersionMismatch { actual: 999, .. }
        ));
    }

    #[test]
    fn decode_rejects_tampered_payload() {
        let raw = craft(BLOB_MAGIC, BLOB_FORMAT_VERSION, b"data", b"tampered");
        let err = decode_blob(Path::new("x.art"), &raw).unwrap_err();
        assert!(matches!(err, CacheError::ChecksumMismatch { .. }));
    }

    #[test]
    fn get_corrupt_file_returns_none() {
        let (_dir, store) = make_store();
        let key = store.put(BlobKind::Artifact, b"original", "0.1.0").unwrap();
        let path = store.blob_path(BlobKind::Artifact, &key);
        let raw = craft(BLOB_MAGIC, BLOB_FORMAT_VERSION, b"original", b"tampered");
        std::fs::write(&path, raw).unwrap();
        assert!(store.get(BlobKind::Artifact, &key).is_none());
    }

    #[test]
    fn blob_path_format() {
        let (_dir, store) = make_store();
        let path = store.blob_path(BlobKind::Snapshot, "abc123");
        assert!(path.ends_with("snapshots/abc123.snap"));
    }

    #[test]
    fn gc_removes_stale_blobs() {
        let (_dir, store) = make_store();
        let key_a = store.put(BlobKind::Artifact, b"artifact A", "0.1.0").unwrap();
        let _key_b = store.put(BlobKind::Artifact, b"artifact B", "0.1.0").unwrap();

        let removed = store.gc(BlobKind::Artifact, &[key_a.as_str()]).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(BlobKind::Artifact, &key_a).is_some());
    }

    #[test]
    fn gc_nonexistent_dir_returns_zero() {
        let (_dir, store) = make_store();
        assert_eq!(store.gc(BlobKind::Snapshot, &[]).unwrap(), 0);
    }
}

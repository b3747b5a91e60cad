//! Failures while writing or validating persisted state.

use std::path::{Path, PathBuf};

/// Why persisted state could not be written or trusted.
///
/// Loading never returns these to callers; an unreadable file is treated as
/// absent. Writes propagate them.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A filesystem operation on `path` failed.
    #[error("cannot access {}: {source}", path.display())]
    Io {
        /// File or directory being accessed.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// Missing magic, truncated header, or an undecodable header.
    #[error("{} is not a weft blob: {reason}", path.display())]
    InvalidHeader {
        /// The blob file.
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },

    /// The payload hash differs from the one recorded in the header.
    #[error("{} is corrupt: header records {expected}, payload hashes to {actual}", path.display())]
    ChecksumMismatch {
        /// The blob file.
        path: PathBuf,
        /// Hash stored in the header.
        expected: String,
        /// Hash of the payload as read.
        actual: String,
    },

    /// Blob written by an incompatible format version.
    #[error("{} has blob format {actual}, this build reads format {expected}", path.display())]
    VersionMismatch {
        /// The blob file.
        path: PathBuf,
        /// Format this build reads.
        expected: u32,
        /// Format found in the file.
        actual: u32,
    },

    /// A header, manifest, or snapshot failed to encode or decode.
    #[error("cannot encode or decode state: {reason}")]
    Serialization {
        /// The codec's message.
        reason: String,
    },
}

impl CacheError {
    /// Wraps an I/O failure on `path`.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

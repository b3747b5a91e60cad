//! On-disk persistence of committed pipeline state.
//!
//! Persistence is an optimisation for a cold restart, never a correctness
//! requirement: every read is fail-safe, and any problem with stored state
//! results in starting from an empty state. The [`StateStore`] keeps a JSON
//! manifest of the last committed artifact set and stores artifact contents
//! and the last input snapshot as checksummed binary blobs.

#![warn(missing_docs)]

pub mod blob;
pub mod error;
pub mod manifest;
pub mod store;

pub use blob::{BlobKind, BlobStore};
pub use error::CacheError;
pub use manifest::{ArtifactRecord, StateManifest};
pub use store::{StateStore, StoredArtifact};

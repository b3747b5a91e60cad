//! Content hashing for cache invalidation and incremental re-evaluation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use xxhash_rust::xxh3::{xxh3_128, Xxh3};

/// A 128-bit content hash computed using XXH3.
///
/// Two values with the same `ContentHash` are assumed to be structurally
/// identical. Used to detect when inputs, intermediate values, or generated
/// artifacts have changed between passes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

/// The structural digest of a computed value.
///
/// Fingerprints decide reuse versus recomputation: a node whose fingerprint
/// matches the previous pass is treated as unchanged.
pub type Fingerprint = ContentHash;

impl ContentHash {
    /// The hash of no content at all.
    pub const EMPTY: ContentHash = ContentHash([0; 16]);

    /// Computes a content hash from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self::from_u128(xxh3_128(data))
    }

    /// Wraps a raw 128-bit digest.
    pub fn from_u128(raw: u128) -> Self {
        Self(raw.to_le_bytes())
    }

    /// Returns the raw 128-bit digest.
    pub fn as_u128(&self) -> u128 {
        u128::from_le_bytes(self.0)
    }

    /// Computes the structural digest of any hashable value.
    ///
    /// The value is fed through its [`Hash`] implementation into a streaming
    /// XXH3 hasher, so two values that are equal under a consistent
    /// `Hash`/`PartialEq` pair always share a digest.
    pub fn of<T: Hash + ?Sized>(value: &T) -> Self {
        let mut hasher = Xxh3::new();
        value.hash(&mut hasher);
        Self::from_u128(hasher.digest128())
    }

    /// Combines an ordered sequence of hashes into one.
    ///
    /// `combine([a, b])` differs from `combine([b, a])`.
    pub fn combine<'a>(parts: impl IntoIterator<Item = &'a ContentHash>) -> Self {
        let mut hasher = Xxh3::new();
        for part in parts {
            hasher.write(&part.0);
        }
        Self::from_u128(hasher.digest128())
    }

    /// Combines an unordered collection of hashes into one.
    ///
    /// The result does not depend on iteration order, so it can summarise
    /// a set of members.
    pub fn combine_unordered(parts: impl IntoIterator<Item = ContentHash>) -> Self {
        let mut sorted: Vec<ContentHash> = parts.into_iter().collect();
        sorted.sort_unstable();
        Self::combine(sorted.iter())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

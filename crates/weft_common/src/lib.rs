//! Shared foundational types used across the Weft pipeline engine.
//!
//! This crate provides content hashing and structural fingerprints for cache
//! invalidation, plus the common internal result type.

#![warn(missing_docs)]

pub mod hash;
pub mod result;

pub use hash::{ContentHash, Fingerprint};
pub use result::{InternalError, WeftResult};

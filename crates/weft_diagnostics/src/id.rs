//! Stable diagnostic identifiers such as `GEN001` or `WEFT002`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable identifier naming the kind of a diagnostic.
///
/// Identifiers are free-form strings chosen by pipeline authors. The
/// conventional shape is an uppercase prefix followed by a zero-padded
/// 3-digit number, which [`DiagnosticId::new`] produces.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagnosticId(String);

impl DiagnosticId {
    /// Creates an identifier from a prefix and a number, e.g. `("GEN", 1)` is `GEN001`.
    pub fn new(prefix: &str, number: u16) -> Self {
        Self(format!("{prefix}{number:03}"))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DiagnosticId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DiagnosticId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for DiagnosticId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

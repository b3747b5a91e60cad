//! Source locations attached to diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in a host-side source file.
///
/// The engine never interprets source text; locations are supplied by the
/// host alongside each syntax fragment and passed through untouched.
/// Lines and columns are 1-based.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Location {
    /// Path of the file as the host reports it.
    pub path: String,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl Location {
    /// Creates a new location.
    pub fn new(path: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            path: path.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.line, self.column)
    }
}

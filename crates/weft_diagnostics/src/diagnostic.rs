//! Structured diagnostic messages with id, severity, category, and location.

use crate::id::DiagnosticId;
use crate::location::Location;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};

/// A structured diagnostic message reported by a generator or by the engine.
///
/// Each diagnostic includes:
/// - A stable identifier and a severity level
/// - A free-form category (e.g. `"Generator"`, `"Transform"`)
/// - A primary message and an optional source location
/// - Explanatory notes
///
/// Diagnostics are not required to be unique within a pass.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The stable identifier of this kind of diagnostic.
    pub id: DiagnosticId,
    /// The severity level of this diagnostic.
    pub severity: Severity,
    /// The category the diagnostic belongs to.
    pub category: String,
    /// The main diagnostic message.
    pub message: String,
    /// Where the issue was detected, if the host supplied a location.
    pub location: Option<Location>,
    /// Explanatory footnotes (e.g., "note: ...").
    pub notes: Vec<String>,
}

impl Diagnostic {
    /// Creates a new diagnostic with the given severity.
    pub fn new(
        id: impl Into<DiagnosticId>,
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            severity,
            category: category.into(),
            message: message.into(),
            location: None,
            notes: Vec::new(),
        }
    }

    /// Creates a new error diagnostic.
    pub fn error(
        id: impl Into<DiagnosticId>,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(id, Severity::Error, category, message)
    }

    /// Creates a new warning diagnostic.
    pub fn warning(
        id: impl Into<DiagnosticId>,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(id, Severity::Warning, category, message)
    }

    /// Creates a new informational diagnostic.
    pub fn info(
        id: impl Into<DiagnosticId>,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(id, Severity::Info, category, message)
    }

    /// Attaches a source location to this diagnostic.
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Adds a note to this diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_error() {
        let diag = Diagnostic::error("WEFT001", "Transform", "transformation failed");
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.message, "transformation failed");
        assert_eq!(diag.id.as_str(), "WEFT001");
        assert!(diag.location.is_none());
    }

    #[test]
    fn create_info_and_warning() {
        let info = Diagnostic::info(DiagnosticId::new("GEN", 1), "Generator", "Processing file: a");
        assert_eq!(info.severity, Severity::Info);
        let warn = Diagnostic::warning("GEN001", "Generator", "EmitLogging: false");
        assert_eq!(warn.severity, Severity::Warning);
        assert_eq!(info.id, warn.id);
    }

    #[test]
    fn builder_methods() {
        let diag = Diagnostic::error("WEFT001", "Transform", "bad field")
            .with_location(Location::new("UserClass.cs", 9, 22))
            .with_note("node #3, item 00ff..")
            .with_note("the item produced no output");
        assert_eq!(diag.notes.len(), 2);
        assert_eq!(diag.location.unwrap().line, 9);
    }

    #[test]
    fn serde_roundtrip() {
        let diag = Diagnostic::warning("GEN001", "Generator", "VisibleProperty: true");
        let json = serde_json::to_string(&diag).unwrap();
        let back: Diagnostic = serde_json::from_str(&json).unwrap();
        assert_eq!(diag, back);
    }
}

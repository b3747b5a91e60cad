//! A diagnostic accumulator shared by the nodes of one pass.

use crate::diagnostic::Diagnostic;
use crate::severity::Severity;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Per-severity totals of the diagnostics held by a [`DiagnosticSink`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeverityCounts {
    /// Error diagnostics.
    pub errors: usize,
    /// Warning diagnostics.
    pub warnings: usize,
    /// Info diagnostics.
    pub infos: usize,
}

impl SeverityCounts {
    /// Sum over all severities.
    pub fn total(&self) -> usize {
        self.errors + self.warnings + self.infos
    }
}

impl fmt::Display for SeverityCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} errors, {} warnings, {} info",
            self.errors, self.warnings, self.infos
        )
    }
}

/// Collects diagnostics from concurrently evaluated nodes.
///
/// Counts are kept per severity in atomics, so [`has_errors`](Self::has_errors)
/// and [`counts`](Self::counts) never wait on the vector lock.
#[derive(Default)]
pub struct DiagnosticSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
    // Indexed by `slot(severity)`.
    counts: [AtomicUsize; 3],
}

fn slot(severity: Severity) -> usize {
    match severity {
        Severity::Info => 0,
        Severity::Warning => 1,
        Severity::Error => 2,
    }
}

impl DiagnosticSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one diagnostic.
    pub fn emit(&self, diag: Diagnostic) {
        self.counts[slot(diag.severity)].fetch_add(1, Ordering::Relaxed);
        self.diagnostics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(diag);
    }

    /// Adds every diagnostic of `diags`, keeping their order.
    pub fn extend(&self, diags: impl IntoIterator<Item = Diagnostic>) {
        let diags: Vec<Diagnostic> = diags.into_iter().collect();
        for diag in &diags {
            self.counts[slot(diag.severity)].fetch_add(1, Ordering::Relaxed);
        }
        self.diagnostics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(diags);
    }

    /// Whether any error has been emitted.
    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }

    /// Number of diagnostics emitted with `severity`.
    pub fn count(&self, severity: Severity) -> usize {
        self.counts[slot(severity)].load(Ordering::Relaxed)
    }

    /// Totals of everything emitted so far. Draining does not reset them.
    pub fn counts(&self) -> SeverityCounts {
        SeverityCounts {
            errors: self.count(Severity::Error),
            warnings: self.count(Severity::Warning),
            infos: self.count(Severity::Info),
        }
    }

    /// Number of diagnostics currently held.
    pub fn len(&self) -> usize {
        self.diagnostics.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the sink currently holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains the sink, returning diagnostics in emission order.
    pub fn take_all(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.diagnostics.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// A copy of the held diagnostics.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn counts_by_severity() {
        let sink = DiagnosticSink::new();
        assert!(sink.is_empty());
        sink.emit(Diagnostic::warning("GEN001", "Generator", "a"));
        sink.emit(Diagnostic::info("GEN001", "Generator", "b"));
        sink.emit(Diagnostic::info("GEN001", "Generator", "c"));
        assert!(!sink.has_errors());
        assert_eq!(
            sink.counts(),
            SeverityCounts {
                errors: 0,
                warnings: 1,
                infos: 2
            }
        );
        assert_eq!(sink.counts().total(), 3);
        assert_eq!(sink.counts().to_string(), "0 errors, 1 warnings, 2 info");
    }

    #[test]
    fn extend_keeps_order_and_counts() {
        let sink = DiagnosticSink::new();
        sink.extend(vec![
            Diagnostic::warning("GEN001", "Generator", "first"),
            Diagnostic::error("WEFT001", "Transform", "second"),
        ]);
        assert!(sink.has_errors());
        let all = sink.take_all();
        assert_eq!(all[0].message, "first");
        assert_eq!(all[1].message, "second");
    }

    #[test]
    fn draining_keeps_counts() {
        let sink = DiagnosticSink::new();
        sink.emit(Diagnostic::error("WEFT001", "Transform", "x"));
        assert_eq!(sink.take_all().len(), 1);
        assert!(sink.take_all().is_empty());
        assert_eq!(sink.count(Severity::Error), 1);
    }

    #[test]
    fn concurrent_emitters() {
        let sink = Arc::new(DiagnosticSink::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    for _ in 0..50 {
                        sink.emit(Diagnostic::warning("GEN001", "Generator", "w"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(sink.count(Severity::Warning), 400);
        assert_eq!(sink.len(), 400);
    }
}

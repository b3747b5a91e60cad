//! Diagnostic creation, severity management, and rendering.
//!
//! This crate provides structured [`Diagnostic`] messages with a stable id,
//! severity, category, and optional source location. The thread-safe
//! [`DiagnosticSink`] accumulates diagnostics during a pass, and
//! [`DiagnosticRenderer`] implementations format them for a terminal or as JSON.

#![warn(missing_docs)]

pub mod diagnostic;
pub mod id;
pub mod location;
pub mod renderer;
pub mod severity;
pub mod sink;

pub use diagnostic::Diagnostic;
pub use id::DiagnosticId;
pub use location::Location;
pub use renderer::{DiagnosticRenderer, JsonRenderer, TerminalRenderer};
pub use severity::Severity;
pub use sink::{DiagnosticSink, SeverityCounts};

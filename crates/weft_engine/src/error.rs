//! Error types for graph construction, item transforms, and passes.

use thiserror::Error;
use weft_common::InternalError;
use weft_diagnostics::{Diagnostic, Location};

use crate::output::SinkError;
use crate::value::NodeId;

/// Diagnostic id for a failed item transformation or output action.
pub const TRANSFORM_FAILED: &str = "WEFT001";
/// Diagnostic id for two artifacts with the same name in one pass.
pub const DUPLICATE_ARTIFACT: &str = "WEFT002";
/// Diagnostic id for a broken engine invariant.
pub const INVARIANT_VIOLATION: &str = "WEFT003";
/// Diagnostic id for an artifact name that is not a plain relative file name.
pub const INVALID_ARTIFACT_NAME: &str = "WEFT004";
/// Diagnostic id for an internal engine failure.
pub const INTERNAL_ERROR: &str = "WEFT005";

/// Errors raised while composing a pipeline. Returned from
/// [`PipelineBuilder::build`](crate::PipelineBuilder::build).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphConstructionError {
    /// The right-hand side of `combine` produces more than one value.
    #[error("cannot combine {left} with {right}: the right-hand provider must be single-valued")]
    InvalidCombine { left: NodeId, right: NodeId },

    /// A provider from another builder was used.
    #[error("provider {node} belongs to a different pipeline builder")]
    ForeignProvider { node: NodeId },

    /// The graph contains a cycle.
    #[error("pipeline graph contains a cycle through {node}")]
    Cycle { node: NodeId },

    /// The pipeline has no terminal outputs.
    #[error("pipeline has no registered outputs")]
    NoOutputs,
}

/// A recoverable failure of one item's transformation.
///
/// Raised from `try_map` closures and output actions. The failing item
/// produces no output; every other item continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransformError {
    pub message: String,
    pub location: Option<Location>,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    /// Attaches the source location the failure refers to.
    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

/// Errors that abort a pass. The committed state is left untouched.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("artifact name `{name}` was emitted by both {first} and {second}")]
    DuplicateArtifactName {
        name: String,
        first: NodeId,
        second: NodeId,
    },

    #[error("artifact name `{name}` emitted by {node} is invalid: {reason}")]
    InvalidArtifactName {
        name: String,
        node: NodeId,
        reason: String,
    },

    #[error("invariant violated at {node}: {message}")]
    InvariantViolation { node: NodeId, message: String },

    #[error("pass was cancelled")]
    Cancelled,

    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl PassError {
    /// The single top-level diagnostic describing this failure.
    ///
    /// Cancellation is not an error from the user's point of view and has no
    /// diagnostic.
    pub fn diagnostic(&self) -> Option<Diagnostic> {
        let id = match self {
            PassError::DuplicateArtifactName { .. } => DUPLICATE_ARTIFACT,
            PassError::InvalidArtifactName { .. } => INVALID_ARTIFACT_NAME,
            PassError::InvariantViolation { .. } => INVARIANT_VIOLATION,
            PassError::Internal(_) => INTERNAL_ERROR,
            PassError::Cancelled => return None,
        };
        Some(Diagnostic::error(id, "Driver", self.to_string()))
    }

    /// Whether this error is a cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PassError::Cancelled)
    }
}

impl From<SinkError> for PassError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::DuplicateName {
                name,
                first,
                second,
            } => PassError::DuplicateArtifactName {
                name,
                first,
                second,
            },
            SinkError::InvalidName { name, node, reason } => PassError::InvalidArtifactName {
                name,
                node,
                reason: reason.to_string(),
            },
        }
    }
}

//! Incremental generator pipelines.
//!
//! A pipeline is a graph of typed [`Provider`]s built with a
//! [`PipelineBuilder`]: sources read the host's [`InputSnapshot`],
//! combinators (`map`, `filter`, `collect`, `group_by`, `combine`) derive new
//! values, and registered outputs emit artifacts and diagnostics. A
//! [`Driver`] evaluates the pipeline pass after pass, recomputing only the
//! items whose inputs changed and replaying cached emissions for the rest.

mod cache;
pub mod cancel;
pub mod driver;
pub mod error;
pub mod input;
mod operator;
pub mod output;
mod persist;
pub mod pipeline;
pub mod value;

pub use cancel::CancellationToken;
pub use driver::{Driver, EvaluationResult, PassStats, Phase};
pub use error::{GraphConstructionError, PassError, TransformError};
pub use input::{
    AdditionalText, BuildOptions, FragmentKind, InputItem, InputSnapshot, SnapshotBuilder,
    SnapshotDiff, SnapshotError, SyntaxFragment, Tagged,
};
pub use output::{
    reconcile, validate_artifact_name, Artifact, ArtifactChanges, DiagnosticPolicy, EmitError,
    OutputContext, OutputSink, SinkError,
};
pub use pipeline::{Arity, Group, Pipeline, PipelineBuilder, Provider};
pub use value::{ItemKey, NodeId, Value, ValueNode};

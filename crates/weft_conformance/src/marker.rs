//! The marker attribute emitted once at post-initialization.

use weft_engine::PipelineBuilder;

/// Artifact holding the attribute definition.
pub const MARKER_FILE: &str = "myGeneratedFile.cs";

/// Source of the `[Generated]` attribute.
pub const MARKER_SOURCE: &str = r#"using System;

namespace GeneratedNamespace
{
    [AttributeUsage(AttributeTargets.Method)]
    internal sealed class GeneratedAttribute : Attribute
    {
    }
}
"#;

/// Registers the marker attribute on `builder`.
pub fn register(builder: &PipelineBuilder) {
    builder.register_post_initialization(|ctx| {
        ctx.add_artifact(MARKER_FILE, MARKER_SOURCE)?;
        Ok(())
    });
}

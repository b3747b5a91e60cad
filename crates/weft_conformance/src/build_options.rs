//! Diagnostics reporting global build options and per-file metadata.

use weft_diagnostics::Diagnostic;
use weft_engine::{AdditionalText, PipelineBuilder};

use crate::auto_notify::GENERATOR_INFO;

/// Global option switching generator logging on.
pub const EMIT_LOG: &str = "emit_log";
/// Global MSBuild property made visible to generators.
pub const VISIBLE_PROPERTY: &str = "build_property.TestVisibleProperty";
/// Per-file MSBuild item metadata made visible to generators.
pub const VISIBLE_ITEM_METADATA: &str = "build_metadata.AdditionalFiles.TestVisibleItemMetadata";

fn is_true(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Reads the per-file metadata switch of one additional text.
pub fn visible_metadata(text: &AdditionalText) -> bool {
    is_true(text.metadata.get(VISIBLE_ITEM_METADATA).map(String::as_str))
}

/// Registers the option and metadata reporters on `builder`.
pub fn register(builder: &PipelineBuilder) {
    let options = builder.options();

    let emit_log = options.select_option(EMIT_LOG).map(|v| is_true(v.as_deref()));
    builder.register_output(&emit_log, |ctx, enabled| {
        ctx.report(Diagnostic::warning(
            GENERATOR_INFO,
            "Generator",
            format!("EmitLogging: {enabled}"),
        ));
        Ok(())
    });

    let visible = options.map(|o| o.get_bool(VISIBLE_PROPERTY));
    builder.register_output(&visible, |ctx, visible| {
        ctx.report(Diagnostic::warning(
            GENERATOR_INFO,
            "Generator",
            format!("VisibleProperty: {visible}"),
        ));
        Ok(())
    });

    let metadata = builder
        .texts()
        .combine(&options)
        .map(|(text, _)| (text.path.clone(), visible_metadata(text)));
    builder.register_output(&metadata, |ctx, (path, visible)| {
        ctx.report(
            Diagnostic::warning(
                GENERATOR_INFO,
                "Generator",
                format!("VisibleMetadata: {visible}"),
            )
            .with_note(format!("file: {path}")),
        );
        Ok(())
    });
}

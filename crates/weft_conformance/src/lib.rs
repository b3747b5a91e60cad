//! Conformance fixtures for the Weft pipeline engine.
//!
//! Implements the sample generators of a demo project on the engine as
//! client pipelines: AutoNotify properties, partial methods, additional
//! `.txt` files, option and metadata diagnostics, and a post-initialization
//! marker attribute. Integration tests under `tests/` drive them through
//! successive snapshots and assert on the artifacts and diagnostics.

#![warn(missing_docs)]

pub mod additional_texts;
pub mod auto_notify;
pub mod build_options;
pub mod inputs;
pub mod marker;
pub mod partial_method;

use weft_config::{load_config_from_str, WeftConfig};
use weft_engine::{
    AdditionalText, Driver, GraphConstructionError, InputSnapshot, Pipeline, PipelineBuilder,
    SyntaxFragment,
};

/// Builds the full demo generator: every fixture on one pipeline.
pub fn custom_generator() -> Result<Pipeline, GraphConstructionError> {
    let builder = PipelineBuilder::new();
    marker::register(&builder);
    partial_method::register(&builder);
    auto_notify::register(&builder);
    additional_texts::register(&builder);
    build_options::register(&builder);
    builder.build()
}

/// Builds a pipeline with only the AutoNotify generator.
pub fn auto_notify_generator() -> Result<Pipeline, GraphConstructionError> {
    let builder = PipelineBuilder::new();
    auto_notify::register(&builder);
    builder.build()
}

/// Creates a driver configuration from `weft.toml` text.
pub fn make_config(parallel: bool) -> WeftConfig {
    let text = format!("[driver]\nparallel = {parallel}\n");
    load_config_from_str(&text).expect("fixture config is valid")
}

/// Creates a configuration with diagnostic deny/allow overrides.
pub fn make_config_with_diagnostics(deny: &[&str], allow: &[&str]) -> WeftConfig {
    let quote = |ids: &[&str]| {
        ids.iter()
            .map(|id| format!("\"{id}\""))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let text = format!(
        "[diagnostics]\ndeny = [{deny}]\nallow = [{allow}]\n",
        deny = quote(deny),
        allow = quote(allow),
    );
    load_config_from_str(&text).expect("fixture config is valid")
}

/// Creates a driver for the full demo generator.
pub fn demo_driver(config: &WeftConfig) -> Driver {
    let pipeline = custom_generator().expect("demo pipeline is well formed");
    Driver::new(pipeline, config).expect("driver starts")
}

/// Assembles a snapshot from fragments, texts, and global options.
pub fn snapshot(
    fragments: Vec<SyntaxFragment>,
    texts: Vec<AdditionalText>,
    options: &[(&str, &str)],
) -> InputSnapshot {
    let mut builder = InputSnapshot::builder();
    for fragment in fragments {
        builder = builder.fragment(fragment);
    }
    for text in texts {
        builder = builder.text(text);
    }
    for (key, value) in options {
        builder = builder.option(*key, *value);
    }
    builder.build().expect("fixture identities are unique")
}

/// The inputs of the demo project's `UserClass` and `TextClass.txt`.
pub fn demo_snapshot() -> InputSnapshot {
    snapshot(
        vec![
            inputs::auto_notify_field("GeneratedNamespace", "UserClass", "_boolProp", "bool"),
            inputs::renamed_field("GeneratedNamespace", "UserClass", "_intProp", "int", "Count"),
            inputs::generated_method("GeneratedNamespace", "UserClass", "UserMethod"),
        ],
        vec![AdditionalText::new(
            "TextClass.txt",
            "public class TextClass { public void TextMethod() {} }",
        )
        .with_metadata(build_options::VISIBLE_ITEM_METADATA, "true")],
        &[("emit_log", "true"), (build_options::VISIBLE_PROPERTY, "false")],
    )
}

//! Parsing and validation of `weft.toml` driver configuration files.
//!
//! This crate reads the engine configuration file and produces a strongly-typed
//! [`WeftConfig`]: driver scheduling, optional cache persistence, and
//! diagnostic allow/deny overrides. Build options consumed by pipelines are
//! not configured here; they travel inside each input snapshot.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use types::*;

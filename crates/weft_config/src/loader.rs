//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::WeftConfig;
use std::collections::HashSet;
use std::path::Path;

/// Name of the configuration file looked up in a project directory.
pub const CONFIG_FILE: &str = "weft.toml";

/// Loads and validates a `weft.toml` configuration from a project directory.
///
/// A missing file is not an error: the defaults are returned.
pub fn load_config(project_dir: &Path) -> Result<WeftConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(WeftConfig::default());
    }
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `weft.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<WeftConfig, ConfigError> {
    let config: WeftConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks that configuration values are consistent.
fn validate_config(config: &WeftConfig) -> Result<(), ConfigError> {
    if config.cache.persist && config.cache.dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "cache.dir must not be empty when cache.persist is enabled".to_string(),
        ));
    }

    let denied: HashSet<&str> = config.diagnostics.deny.iter().map(String::as_str).collect();
    if let Some(id) = config
        .diagnostics
        .allow
        .iter()
        .find(|id| denied.contains(id.as_str()))
    {
        return Err(ConfigError::ValidationError(format!(
            "diagnostic '{id}' is listed in both diagnostics.deny and diagnostics.allow"
        )));
    }
    Ok(())
}

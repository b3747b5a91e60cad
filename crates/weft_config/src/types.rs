//! Configuration types deserialized from `weft.toml`.

use serde::Deserialize;
use std::path::PathBuf;

/// The top-level engine configuration parsed from `weft.toml`.
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeftConfig {
    /// Pass scheduling settings.
    #[serde(default)]
    pub driver: DriverConfig,
    /// Optional on-disk persistence of committed state.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Diagnostic allow/deny overrides.
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// How a driver schedules the work of one pass.
#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    /// Evaluate independent nodes and items on the rayon pool.
    #[serde(default = "default_true")]
    pub parallel: bool,
    /// Size of a dedicated worker pool. `0` uses the global rayon pool.
    #[serde(default)]
    pub threads: usize,
    /// Recompute reused items and fail the pass if a transformation is impure.
    #[serde(default)]
    pub verify_reuse: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            threads: 0,
            verify_reuse: false,
        }
    }
}

/// Where committed state is persisted between process runs.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Directory holding the manifest and stored artifacts.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// Whether the host should persist state after every committed pass.
    #[serde(default)]
    pub persist: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            persist: false,
        }
    }
}

/// Diagnostic overrides keyed by diagnostic id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiagnosticsConfig {
    /// Diagnostic ids promoted to error severity.
    #[serde(default)]
    pub deny: Vec<String>,
    /// Diagnostic ids suppressed entirely.
    #[serde(default)]
    pub allow: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".weft-cache")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = WeftConfig::default();
        assert!(config.driver.parallel);
        assert_eq!(config.driver.threads, 0);
        assert!(!config.driver.verify_reuse);
        assert_eq!(config.cache.dir, PathBuf::from(".weft-cache"));
        assert!(!config.cache.persist);
        assert!(config.diagnostics.deny.is_empty());
    }

    #[test]
    fn partial_section_fills_defaults() {
        let config: WeftConfig = toml::from_str("[driver]\nthreads = 4\n").unwrap();
        assert!(config.driver.parallel);
        assert_eq!(config.driver.threads, 4);
    }
}

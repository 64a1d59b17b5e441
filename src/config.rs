//! Configuration management with TOML support
//!
//! Provides configuration file support with environment variable overrides
//! and sensible defaults. Every field has a serde default so partial files
//! are accepted.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Hard cap on the product of drill lengths across all query axes.
    /// Queries whose computed row x pivot product exceeds this fail fast
    /// before any data-source call.
    #[serde(default = "default_max_product")]
    pub max_product: usize,

    /// Result cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Result cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Capacity of one generation of the in-process cache
    #[serde(default = "default_memory_entries")]
    pub memory_entries: usize,

    /// Root directory for the persistent tier. `None` degrades the
    /// persistent tier to a pure passthrough.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Maximum number of files kept in the persistent tier
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Enable the cache (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_max_product() -> usize {
    1_000_000
}

fn default_memory_entries() -> usize {
    512
}

fn default_max_entries() -> usize {
    1_000
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_product: default_max_product(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_entries: default_memory_entries(),
            root: None,
            max_entries: default_max_entries(),
            enabled: default_true(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| Error::validation(format!("failed to parse config file {}: {}", path, e)))
    }

    /// Load configuration with environment variable overrides applied
    pub fn from_file_with_env(path: &str) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(max) = std::env::var("DICEBOX_MAX_PRODUCT") {
            if let Ok(v) = max.parse() {
                self.max_product = v;
            }
        }
        if let Ok(root) = std::env::var("DICEBOX_CACHE_ROOT") {
            self.cache.root = if root.is_empty() {
                None
            } else {
                Some(PathBuf::from(root))
            };
        }
        if let Ok(entries) = std::env::var("DICEBOX_CACHE_ENTRIES") {
            if let Ok(v) = entries.parse() {
                self.cache.max_entries = v;
            }
        }
    }

    /// Set the combinatorial guard limit
    pub fn with_max_product(mut self, max: usize) -> Self {
        self.max_product = max;
        self
    }

    /// Set the cache configuration
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_product == 0 {
            return Err(Error::validation("max_product cannot be 0"));
        }
        self.cache.validate()
    }
}

impl CacheConfig {
    /// Set the persistent tier root directory
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Set the in-process generation capacity
    pub fn with_memory_entries(mut self, entries: usize) -> Self {
        self.memory_entries = entries;
        self
    }

    /// Set the persistent tier file count bound
    pub fn with_max_entries(mut self, entries: usize) -> Self {
        self.max_entries = entries;
        self
    }

    /// Disable caching entirely
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.memory_entries == 0 {
            return Err(Error::validation("cache.memory_entries cannot be 0"));
        }
        if self.enabled && self.max_entries == 0 {
            return Err(Error::validation("cache.max_entries cannot be 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_product, 1_000_000);
        assert_eq!(config.cache.max_entries, 1_000);
        assert!(config.cache.enabled);
        assert!(config.cache.root.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: EngineConfig = toml::from_str(
            r#"
            max_product = 5000

            [cache]
            root = "/tmp/dicebox-cache"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_product, 5000);
        assert_eq!(config.cache.root, Some(PathBuf::from("/tmp/dicebox-cache")));
        // untouched fields keep defaults
        assert_eq!(config.cache.max_entries, 1_000);
    }

    #[test]
    fn test_validate_rejects_zero_guard() {
        let config = EngineConfig::default().with_max_product(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_max_product(10)
            .with_cache(CacheConfig::default().with_memory_entries(4).disabled());
        assert_eq!(config.max_product, 10);
        assert_eq!(config.cache.memory_entries, 4);
        assert!(!config.cache.enabled);
    }
}

//! Configuration loading.
//!
//! All fields are required. The file is located through `GLEANER_CONFIG`;
//! `GLEANER_CACHE_TTL_SECS` overrides the cache TTL.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const CONFIG_PATH_ENV: &str = "GLEANER_CONFIG";
pub const CACHE_TTL_ENV: &str = "GLEANER_CACHE_TTL_SECS";

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GleanerConfig {
    pub cache: CacheSettings,
    pub parallel: ParallelSettings,
}

/// Where the cache file lives and how long entries stay fresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    /// Path of the cache file. Its directory is created on open.
    pub path: PathBuf,
    pub ttl_secs: u64,
    /// Upper bound on the memory map backing the cache file.
    pub max_size_mb: usize,
    /// Maximum number of distinct loader types (buckets).
    pub max_buckets: u32,
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParallelSettings {
    /// Requested thread count for batch reduction.
    pub batch_threads: usize,
}

impl GleanerConfig {
    /// Load from the file named by `GLEANER_CONFIG`, apply environment
    /// overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingConfigPath)?;
        let mut config = Self::from_path(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Apply overrides from a key lookup (the process environment in
    /// [`GleanerConfig::load`]).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(CACHE_TTL_ENV) {
            self.cache.ttl_secs = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "cache.ttl_secs",
                reason: format!("{} is not a whole number of seconds: {:?}", CACHE_TTL_ENV, raw),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "cache.path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.ttl_secs",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.max_size_mb",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.max_buckets == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.max_buckets",
                reason: "must be > 0".to_string(),
            });
        }
        if self.parallel.batch_threads == 0 {
            return Err(ConfigError::InvalidValue {
                field: "parallel.batch_threads",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

//! Cache Manager Configuration
//!
//! Plain serde structs with defaults for every field, so a YAML file only
//! needs to name what it changes.

use crate::cache::strategy::StrategyConfig;
use crate::cache::tier::CacheTier;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// Local Storage
// =============================================================================

/// Configuration for the local (on-disk) tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalStorageConfig {
    /// Directory holding one JSON file per entry
    pub root_path: PathBuf,
    /// Byte quota; writes past it are skipped (None = unbounded)
    pub capacity_bytes: Option<u64>,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_path: std::env::temp_dir().join("unified-cache"),
            capacity_bytes: None,
        }
    }
}

// =============================================================================
// HTTP Cache
// =============================================================================

/// Configuration for the HTTP-response tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpCacheConfig {
    /// TTL for responses without `Cache-Control: max-age`
    pub default_ttl_ms: u64,
    /// Request headers that distinguish cached responses
    pub vary_headers: Vec<String>,
    /// Share one network call between concurrent identical requests
    pub dedupe_in_flight: bool,
}

impl Default for HttpCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 5 * 60 * 1000,
            vary_headers: vec!["accept".to_string()],
            dedupe_in_flight: true,
        }
    }
}

impl HttpCacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }
}

// =============================================================================
// Cache Manager
// =============================================================================

/// Top-level configuration for a [`CacheManager`](crate::cache::CacheManager)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheManagerConfig {
    /// Prefix isolating this manager's persisted entries
    pub namespace: String,
    /// Tier used when a write names none
    pub default_storage: CacheTier,
    pub local: LocalStorageConfig,
    pub http: HttpCacheConfig,
    /// Initial strategy
    pub strategy: StrategyConfig,
    /// Event channel capacity
    pub event_channel_capacity: usize,
    /// Background sweep period (None = no background sweeper)
    pub sweep_interval_ms: Option<u64>,
}

impl Default for CacheManagerConfig {
    fn default() -> Self {
        Self {
            namespace: "cache".to_string(),
            default_storage: CacheTier::Memory,
            local: LocalStorageConfig::default(),
            http: HttpCacheConfig::default(),
            strategy: StrategyConfig::default(),
            event_channel_capacity: 1024,
            sweep_interval_ms: None,
        }
    }
}

impl CacheManagerConfig {
    /// Load from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the manager cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() || self.namespace.contains(':') {
            return Err(Error::Configuration(format!(
                "namespace '{}' must be non-empty and contain no ':'",
                self.namespace
            )));
        }
        if self.default_storage == CacheTier::Http {
            return Err(Error::Configuration(
                "the http tier only holds responses and cannot be the default storage".into(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::Configuration(
                "event_channel_capacity must be positive".into(),
            ));
        }
        if self.sweep_interval_ms == Some(0) {
            return Err(Error::Configuration(
                "sweep_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_ms.map(Duration::from_millis)
    }
}

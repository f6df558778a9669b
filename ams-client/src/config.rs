//! Configuration loading for the AMS client.
//!
//! All fields are required unless explicitly marked optional. No defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ams_cache::Freshness;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub plant: String,
    pub request_timeout_ms: u64,
    pub cache: CacheConfig,
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    pub namespace: String,
    /// LMDB directory; the persistent tier stays in memory when absent.
    pub store_path: Option<PathBuf>,
    pub store_max_size_mb: usize,
    /// TTL for KPI, flood, bad-actor and breakdown endpoints. `<= 0` always refreshes.
    pub kpi_ttl_ms: i64,
    /// TTL for raw alarm record pages. `<= 0` always refreshes.
    pub records_ttl_ms: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamConfig {
    pub path: String,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or AMS_CLIENT_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.api_base_url.trim();
        if base.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !base.starts_with("http://") && !base.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if self.plant.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "plant",
                reason: "must not be empty".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.namespace.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "cache.namespace",
                reason: "must not be empty".to_string(),
            });
        }
        if self.cache.store_max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.store_max_size_mb",
                reason: "must be > 0".to_string(),
            });
        }
        if let Some(path) = &self.cache.store_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "cache.store_path",
                    reason: "must not be empty when set".to_string(),
                });
            }
        }
        if !self.stream.path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "stream.path",
                reason: "must start with '/'".to_string(),
            });
        }
        if self.stream.idle_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "stream.idle_timeout_ms",
                reason: "must be > 0 when set".to_string(),
            });
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.api_base_url.trim().trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn kpi_freshness(&self) -> Freshness {
        Freshness::from_ttl_ms(self.cache.kpi_ttl_ms)
    }

    pub fn records_freshness(&self) -> Freshness {
        Freshness::from_ttl_ms(self.cache.records_ttl_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.stream.idle_timeout_ms.map(Duration::from_millis)
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("AMS_CLIENT_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

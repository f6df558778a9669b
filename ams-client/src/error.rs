//! Error types for the client binary and its wiring.

use ams_cache::LmdbStoreError;
use ams_core::AmsError;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Store(#[from] LmdbStoreError),
    #[error(transparent)]
    Ams(#[from] AmsError),
    #[error("Usage: {0}")]
    Usage(String),
    #[error("Logging setup failed: {0}")]
    Telemetry(String),
}

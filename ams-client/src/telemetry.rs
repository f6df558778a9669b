//! Logging setup for the `ams` binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::ClientError;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "ams_client=info,ams_cache=info,warn";

/// Install a stderr fmt subscriber filtered by `RUST_LOG`.
///
/// Stdout is left for command output.
pub fn init_tracing() -> Result<(), ClientError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| ClientError::Telemetry(e.to_string()))
}

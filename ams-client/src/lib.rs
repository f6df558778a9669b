//! AMS client library exports.
//!
//! Cached alarm analytics over HTTP and the agent SSE stream, built on the
//! tiers and coalescing in `ams-cache`.

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod sse;
pub mod stream;
pub mod telemetry;
pub mod transport;

pub use api::{AlarmApi, Endpoint, EndpointTtls};
pub use client::AmsClient;
pub use config::{ClientConfig, ConfigError};
pub use error::ClientError;
pub use orchestrator::{FetchOptions, FetchOrchestrator};
pub use sse::{SseDecoder, SseMessage};
pub use stream::{AbortHandle, AgentStream, StreamClient, StreamState};
pub use transport::ReqwestTransport;

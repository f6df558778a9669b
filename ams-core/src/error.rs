//! Error types for AMS data-access operations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why a fetch or stream stopped before it settled on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// The caller invoked its abort handle.
    Cancelled,
    /// An advisory timer fired.
    Timeout,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::Timeout => f.write_str("timeout"),
        }
    }
}

/// Transport layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("Invalid request to {url}: {reason}")]
    InvalidRequest { url: String, reason: String },
}

impl TransportError {
    /// HTTP status carried by this error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Persistent store errors.
///
/// These never reach callers of the cache: write-through failures are
/// logged and counted, read failures degrade to a miss.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Quota exceeded writing {key}: needs {needed} bytes, {available} available")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },

    #[error("Failed to serialize entry for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Persistent store backend error: {reason}")]
    Backend { reason: String },

    #[error("Persistent store lock poisoned")]
    LockPoisoned,
}

/// Master error type for all AMS data-access errors.
///
/// `Clone` so a single failed network call can be handed to every caller
/// that was coalesced onto it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AmsError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Request timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Operation aborted ({reason})")]
    Aborted { reason: AbortReason },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Stream protocol error: {reason}")]
    StreamProtocol { reason: String },

    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl AmsError {
    pub fn serialization(reason: impl fmt::Display) -> Self {
        Self::Serialization {
            reason: reason.to_string(),
        }
    }

    pub fn stream_protocol(reason: impl fmt::Display) -> Self {
        Self::StreamProtocol {
            reason: reason.to_string(),
        }
    }

    pub fn internal(reason: impl fmt::Display) -> Self {
        Self::Internal {
            reason: reason.to_string(),
        }
    }

    /// True for timeouts and explicit cancellation.
    ///
    /// Aborts are a normal termination path; UI layers should not render
    /// them as failures.
    pub fn is_abort(&self) -> bool {
        self.abort_reason().is_some()
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            Self::Timeout { .. } => Some(AbortReason::Timeout),
            Self::Aborted { reason } => Some(*reason),
            _ => None,
        }
    }

    /// HTTP status for server-side failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(err) => err.status(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AmsError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err)
    }
}

/// Result type alias for AMS operations.
pub type AmsResult<T> = Result<T, AmsError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display_status() {
        let err = TransportError::Status {
            url: "http://backend/api/overall".to_string(),
            status: 503,
            body: "busy".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("503"));
        assert!(msg.contains("/api/overall"));
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn test_timeout_is_abort_but_distinct_from_cancel() {
        let timeout = AmsError::Timeout {
            after: Duration::from_millis(250),
        };
        let cancelled = AmsError::Aborted {
            reason: AbortReason::Cancelled,
        };

        assert!(timeout.is_abort());
        assert!(cancelled.is_abort());
        assert_eq!(timeout.abort_reason(), Some(AbortReason::Timeout));
        assert_eq!(cancelled.abort_reason(), Some(AbortReason::Cancelled));
        assert_ne!(timeout, cancelled);
    }

    #[test]
    fn test_server_failure_is_not_abort() {
        let err = AmsError::from(TransportError::Status {
            url: "u".to_string(),
            status: 500,
            body: String::new(),
        });
        assert!(!err.is_abort());
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_serde_json_error_maps_to_serialization() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err = AmsError::from(parse.expect_err("invalid json should fail"));
        assert!(matches!(err, AmsError::Serialization { .. }));
    }

    #[test]
    fn test_ams_error_from_variants() {
        let persistence = AmsError::from(PersistenceError::LockPoisoned);
        assert!(matches!(persistence, AmsError::Persistence(_)));

        let transport = AmsError::from(TransportError::Network {
            url: "u".to_string(),
            reason: "connection refused".to_string(),
        });
        assert!(matches!(transport, AmsError::Transport(_)));
        assert_eq!(transport.status(), None);
    }
}

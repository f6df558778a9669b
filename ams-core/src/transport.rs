//! HTTP transport seam.
//!
//! The cache and stream layers never talk to an HTTP library directly; they
//! go through [`HttpTransport`] so tests can script responses and count
//! calls. Timeouts and cancellation are applied by the callers, which drop
//! the transport future to abort it.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::de::DeserializeOwned;

use crate::{AmsResult, TransportError};

/// Body chunks of a streaming response, in arrival order.
pub type ByteStream = BoxStream<'static, AmsResult<Bytes>>;

/// A fully buffered HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok_json(value: &serde_json::Value) -> Self {
        Self::new(200, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body of a 2xx response, or a [`TransportError::Status`] naming `url`.
    pub fn into_success_body(self, url: &str) -> Result<Bytes, TransportError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(TransportError::Status {
                url: url.to_string(),
                status: self.status,
                body: String::from_utf8_lossy(&self.body).into_owned(),
            })
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> AmsResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Minimal HTTP surface needed by the data-access layer.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    /// GET `url` and buffer the whole body.
    async fn get(&self, url: &str) -> AmsResult<HttpResponse>;

    /// POST a JSON body to `url` and buffer the whole response.
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> AmsResult<HttpResponse>;

    /// POST a JSON body expecting `text/event-stream`.
    ///
    /// Non-2xx statuses fail before any chunk is yielded. Dropping the
    /// returned stream releases the connection.
    async fn open_event_stream(&self, url: &str, body: &serde_json::Value)
        -> AmsResult<ByteStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_body_passthrough() {
        let response = HttpResponse::new(204, "");
        assert!(response.is_success());
        assert!(response.into_success_body("u").is_ok());
    }

    #[test]
    fn test_non_success_carries_status_and_body() {
        let response = HttpResponse::new(429, "slow down");
        let err = response
            .into_success_body("http://backend/api")
            .expect_err("429 should fail");
        assert_eq!(err.status(), Some(429));
        assert!(err.to_string().contains("slow down"));
    }

    #[test]
    fn test_json_decode() {
        let response = HttpResponse::ok_json(&serde_json::json!({"a": 1}));
        let value: serde_json::Value = response.json().expect("valid json");
        assert_eq!(value["a"], 1);
    }
}

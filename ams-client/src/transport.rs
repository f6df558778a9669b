//! reqwest implementation of [`HttpTransport`].

use std::time::Duration;

use ams_core::{AmsError, AmsResult, ByteStream, HttpResponse, HttpTransport, TransportError};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderValue, ACCEPT};

use crate::config::ClientConfig;

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Client with a connect timeout only; request deadlines are applied by
    /// the caller so long-lived event streams are not cut off.
    pub fn new(config: &ClientConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .build()?;
        Ok(Self { client })
    }

    pub fn with_connect_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().connect_timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn buffer(url: &str, response: reqwest::Response) -> AmsResult<HttpResponse> {
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| map_error(url, e))?;
        Ok(HttpResponse::new(status, body))
    }
}

fn map_error(url: &str, err: reqwest::Error) -> AmsError {
    let url = url.to_string();
    let reason = err.to_string();
    if err.is_builder() {
        TransportError::InvalidRequest { url, reason }.into()
    } else {
        TransportError::Network { url, reason }.into()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> AmsResult<HttpResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_error(url, e))?;
        Self::buffer(url, response).await
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> AmsResult<HttpResponse> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| map_error(url, e))?;
        Self::buffer(url, response).await
    }

    async fn open_event_stream(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> AmsResult<ByteStream> {
        let response = self
            .client
            .post(url)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .json(body)
            .send()
            .await
            .map_err(|e| map_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: text,
            }
            .into());
        }

        let owned_url = url.to_string();
        Ok(response
            .bytes_stream()
            .map_err(move |e| map_error(&owned_url, e))
            .boxed())
    }
}

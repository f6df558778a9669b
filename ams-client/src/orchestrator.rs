//! Fetch-with-cache.
//!
//! One entry point composes the two cache tiers, request coalescing and a
//! timed network call:
//!
//! 1. fresh memory entry: returned with no I/O
//! 2. fresh persisted entry: promoted to memory and returned
//! 3. identical request already in flight: joined
//! 4. otherwise one network call; a 2xx body that decodes is written
//!    through both tiers before any caller sees it
//!
//! Failures, timeouts and cancellations never create a cache entry.

use std::sync::Arc;
use std::time::Duration;

use ams_cache::{
    CacheRead, Freshness, InFlightRegistry, Registration, RequestCache, SharedPayload,
};
use ams_core::{AmsError, AmsResult, CacheEntry, CacheKey, HttpTransport};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

/// Per-call options. Unset fields fall back to the orchestrator's defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub freshness: Freshness,
    pub timeout: Option<Duration>,
}

impl FetchOptions {
    pub fn new(freshness: Freshness) -> Self {
        Self {
            freshness,
            timeout: None,
        }
    }

    /// Accept cached data younger than `ttl_ms`; `<= 0` always refreshes.
    pub fn ttl_ms(ttl_ms: i64) -> Self {
        Self::new(Freshness::from_ttl_ms(ttl_ms))
    }

    pub fn refresh() -> Self {
        Self::new(Freshness::Refresh)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl From<Freshness> for FetchOptions {
    fn from(freshness: Freshness) -> Self {
        Self::new(freshness)
    }
}

/// Checks a decoded body against an endpoint schema before it is cached.
type Validator = fn(&serde_json::Value) -> AmsResult<()>;

fn accept_any(_: &serde_json::Value) -> AmsResult<()> {
    Ok(())
}

fn validate_as<T: DeserializeOwned>(value: &serde_json::Value) -> AmsResult<()> {
    T::deserialize(value).map(|_| ()).map_err(AmsError::from)
}

fn decode<T: DeserializeOwned>(payload: SharedPayload) -> Result<T, serde_json::Error> {
    T::deserialize(payload.as_ref())
}

pub struct FetchOrchestrator {
    transport: Arc<dyn HttpTransport>,
    cache: Arc<RequestCache>,
    in_flight: InFlightRegistry<CacheEntry<SharedPayload>>,
    base_url: String,
    default_timeout: Option<Duration>,
}

impl FetchOrchestrator {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        cache: Arc<RequestCache>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            cache,
            in_flight: InFlightRegistry::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_timeout: None,
        }
    }

    /// Timeout applied when a call does not set its own.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn cache(&self) -> &Arc<RequestCache> {
        &self.cache
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a cache key or API path.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Number of network calls currently pending.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Abort the pending network call for `key`, if any.
    pub fn cancel(&self, key: &CacheKey) -> bool {
        self.in_flight.cancel(key)
    }

    /// Fetch the raw JSON payload for `key`.
    pub async fn fetch_with_cache(
        &self,
        key: &CacheKey,
        options: impl Into<FetchOptions>,
    ) -> AmsResult<CacheRead<SharedPayload>> {
        let options = options.into();
        if let Some(read) = self.cache.get_fresh(key, &options.freshness) {
            return Ok(read);
        }
        self.coalesced(key, options, accept_any).await
    }

    /// Fetch `key` and decode it as `T`.
    ///
    /// Network bodies that do not decode as `T` fail and are not cached.
    /// A cached payload that no longer decodes is evicted and refetched.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
        options: impl Into<FetchOptions>,
    ) -> AmsResult<CacheRead<T>> {
        let options = options.into();
        if let Some(read) = self.cache.get_fresh(key, &options.freshness) {
            match read.try_map(decode::<T>) {
                Ok(read) => return Ok(read),
                Err(e) => {
                    warn!(key = %key, error = %e, "cached payload no longer matches schema");
                    self.cache.remove(key);
                }
            }
        }

        let read = self.coalesced(key, options, validate_as::<T>).await?;
        read.try_map(decode::<T>).map_err(AmsError::from)
    }

    async fn coalesced(
        &self,
        key: &CacheKey,
        options: FetchOptions,
        validate: Validator,
    ) -> AmsResult<CacheRead<SharedPayload>> {
        let timeout = options.timeout.or(self.default_timeout);
        let (operation, registration) = self.in_flight.register(key, || {
            network_fetch(
                Arc::clone(&self.transport),
                Arc::clone(&self.cache),
                key.clone(),
                self.url_for(key.as_str()),
                timeout,
                validate,
            )
        });
        if registration == Registration::Joined {
            debug!(key = %key, "joined in-flight fetch");
        }

        let entry = operation.await?;
        Ok(CacheRead::from_network(
            entry.payload,
            entry.timestamp,
            registration.joined(),
        ))
    }

    /// Uncached POST of a JSON body, decoded as `T`.
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> AmsResult<T> {
        let url = self.url_for(path);
        let request = self.transport.post_json(&url, body);
        let response = with_timeout(self.default_timeout, request).await?;
        let bytes = response.into_success_body(&url)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl std::fmt::Debug for FetchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("base_url", &self.base_url)
            .field("default_timeout", &self.default_timeout)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

async fn with_timeout<T>(
    timeout: Option<Duration>,
    future: impl std::future::Future<Output = AmsResult<T>>,
) -> AmsResult<T> {
    match timeout {
        Some(after) => tokio::time::timeout(after, future)
            .await
            .map_err(|_| AmsError::Timeout { after })?,
        None => future.await,
    }
}

/// The single network call behind a coalesced fetch.
async fn network_fetch(
    transport: Arc<dyn HttpTransport>,
    cache: Arc<RequestCache>,
    key: CacheKey,
    url: String,
    timeout: Option<Duration>,
    validate: Validator,
) -> AmsResult<CacheEntry<SharedPayload>> {
    debug!(url = %url, "fetching from network");
    let response = with_timeout(timeout, transport.get(&url)).await.map_err(|e| {
        warn!(url = %url, error = %e, "fetch failed");
        e
    })?;

    let body = response.into_success_body(&url).map_err(|e| {
        warn!(url = %url, status = ?e.status(), "fetch returned error status");
        AmsError::from(e)
    })?;
    let value: serde_json::Value = serde_json::from_slice(&body)?;
    validate(&value)?;

    let entry = CacheEntry::new(Arc::new(value));
    cache.put(&key, entry.clone());
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ams_cache::ReadSource;
    use ams_test_utils::fixtures::{self, url};
    use ams_test_utils::{Scripted, ScriptedTransport};
    use ams_core::{HttpResponse, OverallKpis};
    use serde_json::json;

    fn orchestrator(transport: Arc<ScriptedTransport>) -> FetchOrchestrator {
        FetchOrchestrator::new(
            transport,
            Arc::new(RequestCache::in_memory()),
            fixtures::BASE_URL,
        )
    }

    #[tokio::test]
    async fn test_network_then_memory() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_json(url("/api/PVCI/kpis/overall"), fixtures::overall_kpis());
        let orchestrator = orchestrator(transport.clone());
        let key = CacheKey::new("/api/PVCI/kpis/overall");

        let first = orchestrator
            .fetch::<OverallKpis>(&key, FetchOptions::ttl_ms(60_000))
            .await
            .expect("fetch should succeed");
        let second = orchestrator
            .fetch::<OverallKpis>(&key, FetchOptions::ttl_ms(60_000))
            .await
            .expect("fetch should succeed");

        assert_eq!(first.source(), ReadSource::Network);
        assert_eq!(second.source(), ReadSource::Memory);
        assert_eq!(first.value(), second.value());
        assert_eq!(transport.calls(&url("/api/PVCI/kpis/overall")), 1);
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_not_cached() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_json(url("/api/PVCI/kpis/overall"), json!({"unexpected": true}));
        let orchestrator = orchestrator(transport.clone());
        let key = CacheKey::new("/api/PVCI/kpis/overall");

        let err = orchestrator
            .fetch::<OverallKpis>(&key, FetchOptions::ttl_ms(60_000))
            .await
            .expect_err("schema mismatch should fail");

        assert!(matches!(err, AmsError::Serialization { .. }));
        assert!(orchestrator.cache().get(&key).is_none());
    }

    #[tokio::test]
    async fn test_refresh_bypasses_fresh_entry() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_json(url("/x"), json!(1));
        let orchestrator = orchestrator(transport.clone());
        let key = CacheKey::new("/x");

        orchestrator
            .fetch_with_cache(&key, FetchOptions::ttl_ms(60_000))
            .await
            .expect("fetch should succeed");
        orchestrator
            .fetch_with_cache(&key, FetchOptions::ttl_ms(0))
            .await
            .expect("fetch should succeed");

        assert_eq!(transport.calls(&url("/x")), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_distinguished() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_json(url("/slow"), json!(1));
        transport.close_gate();
        let orchestrator = orchestrator(transport.clone());
        let key = CacheKey::new("/slow");

        let err = orchestrator
            .fetch_with_cache(
                &key,
                FetchOptions::ttl_ms(60_000).with_timeout(Duration::from_millis(20)),
            )
            .await
            .expect_err("gated request should time out");

        assert!(err.is_abort());
        assert_eq!(err.status(), None);
        assert!(orchestrator.cache().get(&key).is_none());
        assert_eq!(orchestrator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_post_is_uncached() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_once(
            url("/api/PVCI/cache/regenerate"),
            Scripted::Response(HttpResponse::ok_json(&fixtures::regenerate_accepted())),
        );
        let orchestrator = orchestrator(transport.clone());

        let response: serde_json::Value = orchestrator
            .post("/api/PVCI/cache/regenerate", &json!({}))
            .await
            .expect("post should succeed");

        assert_eq!(response["status"], "ok");
        assert!(orchestrator.cache().memory_keys().is_empty());
        assert_eq!(transport.posted().len(), 1);
    }
}

use ams_cache::{Freshness, MemoryStore, Namespace, ReadSource, RequestCache};
use ams_client::{FetchOptions, FetchOrchestrator};
use ams_core::{AbortReason, AmsError, CacheEntry, CacheKey, HttpResponse, TransportError};
use ams_test_utils::fixtures::{self, url};
use ams_test_utils::{Scripted, ScriptedTransport};
use futures_util::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const KPI_PATH: &str = "/api/PVCI/kpis/overall";

struct Harness {
    transport: Arc<ScriptedTransport>,
    store: Arc<MemoryStore>,
    orchestrator: Arc<FetchOrchestrator>,
}

fn harness() -> Harness {
    let transport = Arc::new(ScriptedTransport::new());
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(RequestCache::new(store.clone(), Namespace::default()));
    let orchestrator = Arc::new(FetchOrchestrator::new(
        transport.clone(),
        cache,
        fixtures::BASE_URL,
    ));
    Harness {
        transport,
        store,
        orchestrator,
    }
}

async fn wait_until_requested(transport: &ScriptedTransport, url: &str) {
    for _ in 0..200 {
        if transport.calls(url) > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("request to {} never reached the transport", url);
}

#[tokio::test]
async fn concurrent_cold_fetches_share_one_call() {
    let h = harness();
    h.transport
        .respond_json(url(KPI_PATH), fixtures::overall_kpis());
    h.transport.close_gate();
    let key = CacheKey::new(KPI_PATH);

    let callers = (0..8).map(|_| {
        let orchestrator = Arc::clone(&h.orchestrator);
        let key = key.clone();
        tokio::spawn(async move {
            orchestrator
                .fetch_with_cache(&key, FetchOptions::ttl_ms(60_000))
                .await
        })
    });
    let handles: Vec<_> = callers.collect();
    wait_until_requested(&h.transport, &url(KPI_PATH)).await;
    h.transport.open_gate();

    let results = join_all(handles).await;
    let reads: Vec<_> = results
        .into_iter()
        .map(|r| r.expect("task should not panic").expect("fetch should succeed"))
        .collect();

    assert_eq!(h.transport.calls(&url(KPI_PATH)), 1);
    assert!(reads.iter().all(|r| r.value() == reads[0].value()));
    assert_eq!(reads.iter().filter(|r| !r.joined_in_flight()).count(), 1);
}

#[tokio::test]
async fn concurrent_failures_are_shared_and_not_cached() {
    let h = harness();
    h.transport.respond(url(KPI_PATH), HttpResponse::new(500, "boom"));
    h.transport.close_gate();
    let key = CacheKey::new(KPI_PATH);

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let orchestrator = Arc::clone(&h.orchestrator);
            let key = key.clone();
            tokio::spawn(async move {
                orchestrator
                    .fetch_with_cache(&key, FetchOptions::ttl_ms(60_000))
                    .await
            })
        })
        .collect();
    wait_until_requested(&h.transport, &url(KPI_PATH)).await;
    h.transport.open_gate();

    for result in join_all(handles).await {
        let err = result
            .expect("task should not panic")
            .expect_err("500 should fail");
        assert_eq!(err.status(), Some(500));
    }
    assert_eq!(h.transport.calls(&url(KPI_PATH)), 1);
    assert!(h.orchestrator.cache().get(&key).is_none());
    assert!(h.store.is_empty());

    h.transport.respond_json(url(KPI_PATH), fixtures::overall_kpis());
    let retry = h
        .orchestrator
        .fetch_with_cache(&key, FetchOptions::ttl_ms(60_000))
        .await
        .expect("retry should succeed");
    assert_eq!(retry.source(), ReadSource::Network);
    assert_eq!(h.transport.calls(&url(KPI_PATH)), 2);
}

#[tokio::test]
async fn failure_then_immediate_retry_issues_new_call() {
    let h = harness();
    h.transport
        .respond_json(url(KPI_PATH), fixtures::overall_kpis())
        .respond_once(
            url(KPI_PATH),
            Scripted::Failure(AmsError::Transport(TransportError::Network {
                url: url(KPI_PATH),
                reason: "connection reset".into(),
            })),
        );
    let key = CacheKey::new(KPI_PATH);

    let err = h
        .orchestrator
        .fetch_with_cache(&key, FetchOptions::ttl_ms(60_000))
        .await
        .expect_err("first call fails");
    assert!(!err.is_abort());

    h.orchestrator
        .fetch_with_cache(&key, FetchOptions::ttl_ms(60_000))
        .await
        .expect("second call succeeds");
    assert_eq!(h.transport.calls(&url(KPI_PATH)), 2);
}

#[tokio::test]
async fn ttl_expiry_triggers_exactly_one_call() {
    let h = harness();
    h.transport.respond_json(url(KPI_PATH), fixtures::overall_kpis());
    let key = CacheKey::new(KPI_PATH);
    let written = chrono::Utc::now() - chrono::Duration::minutes(10);
    h.orchestrator
        .cache()
        .put(&key, CacheEntry::at(Arc::new(fixtures::overall_kpis()), written));

    let within = h
        .orchestrator
        .fetch_with_cache(&key, Freshness::max_age(Duration::from_secs(15 * 60)))
        .await
        .expect("fresh for a 15 minute caller");
    assert_eq!(within.source(), ReadSource::Memory);
    assert_eq!(h.transport.total_calls(), 0);

    let expired = h
        .orchestrator
        .fetch_with_cache(&key, Freshness::max_age(Duration::from_secs(5 * 60)))
        .await
        .expect("stale for a 5 minute caller");
    assert_eq!(expired.source(), ReadSource::Network);

    let after = h
        .orchestrator
        .fetch_with_cache(&key, Freshness::max_age(Duration::from_secs(5 * 60)))
        .await
        .expect("refreshed entry is fresh");
    assert_eq!(after.source(), ReadSource::Memory);
    assert_eq!(h.transport.calls(&url(KPI_PATH)), 1);
}

#[tokio::test]
async fn persisted_hit_is_promoted_without_network() {
    let h = harness();
    let key = CacheKey::new(KPI_PATH);
    h.orchestrator
        .cache()
        .put(&key, CacheEntry::new(Arc::new(fixtures::overall_kpis())));
    h.orchestrator.cache().reset();

    let first = h
        .orchestrator
        .fetch_with_cache(&key, FetchOptions::ttl_ms(60_000))
        .await
        .expect("persisted hit");
    let reads_after_first = h.store.reads();
    let second = h
        .orchestrator
        .fetch_with_cache(&key, FetchOptions::ttl_ms(60_000))
        .await
        .expect("memory hit");

    assert_eq!(first.source(), ReadSource::Persistent);
    assert_eq!(second.source(), ReadSource::Memory);
    assert_eq!(h.store.reads(), reads_after_first);
    assert_eq!(h.transport.total_calls(), 0);
}

#[tokio::test]
async fn corrupt_persisted_entry_falls_through_to_network() {
    let h = harness();
    h.transport.respond_json(url(KPI_PATH), fixtures::overall_kpis());
    let key = CacheKey::new(KPI_PATH);
    ams_cache::PersistentStore::set(
        h.store.as_ref(),
        &Namespace::default().scoped(&key),
        "{\"timestamp\":",
    )
    .expect("set should succeed");

    let read = h
        .orchestrator
        .fetch_with_cache(&key, FetchOptions::ttl_ms(60_000))
        .await
        .expect("corruption is a miss, not an error");
    assert_eq!(read.source(), ReadSource::Network);
}

#[tokio::test]
async fn zero_ttl_refreshes_but_still_coalesces() {
    let h = harness();
    h.transport.respond_json(url(KPI_PATH), json!({"n": 1}));
    let key = CacheKey::new(KPI_PATH);
    h.orchestrator
        .cache()
        .put(&key, CacheEntry::new(Arc::new(json!({"n": 0}))));
    h.transport.close_gate();

    let a = {
        let orchestrator = Arc::clone(&h.orchestrator);
        let key = key.clone();
        tokio::spawn(async move { orchestrator.fetch_with_cache(&key, FetchOptions::ttl_ms(0)).await })
    };
    wait_until_requested(&h.transport, &url(KPI_PATH)).await;
    let b = {
        let orchestrator = Arc::clone(&h.orchestrator);
        let key = key.clone();
        tokio::spawn(async move { orchestrator.fetch_with_cache(&key, FetchOptions::ttl_ms(-5)).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    h.transport.open_gate();

    let a = a.await.expect("no panic").expect("refresh succeeds");
    let b = b.await.expect("no panic").expect("refresh succeeds");
    assert_eq!(**a.value(), json!({"n": 1}));
    assert!(b.joined_in_flight());
    assert_eq!(h.transport.calls(&url(KPI_PATH)), 1);
}

#[tokio::test]
async fn timeout_is_not_cached_and_retry_goes_to_network() {
    let h = harness();
    h.transport.respond_json(url(KPI_PATH), fixtures::overall_kpis());
    h.transport.set_delay(Duration::from_millis(200));
    let key = CacheKey::new(KPI_PATH);

    let err = h
        .orchestrator
        .fetch_with_cache(
            &key,
            FetchOptions::ttl_ms(60_000).with_timeout(Duration::from_millis(10)),
        )
        .await
        .expect_err("should time out");
    assert_eq!(err.abort_reason(), Some(AbortReason::Timeout));
    assert!(h.orchestrator.cache().get(&key).is_none());
    assert!(h.store.is_empty());

    h.transport.set_delay(Duration::ZERO);
    h.orchestrator
        .fetch_with_cache(&key, FetchOptions::ttl_ms(60_000))
        .await
        .expect("retry should succeed");
    assert_eq!(h.transport.calls(&url(KPI_PATH)), 2);
}

#[tokio::test]
async fn cancelled_fetch_is_an_abort_and_not_cached() {
    let h = harness();
    h.transport.respond_json(url(KPI_PATH), fixtures::overall_kpis());
    h.transport.close_gate();
    let key = CacheKey::new(KPI_PATH);

    let pending = {
        let orchestrator = Arc::clone(&h.orchestrator);
        let key = key.clone();
        tokio::spawn(async move {
            orchestrator
                .fetch_with_cache(&key, FetchOptions::ttl_ms(60_000))
                .await
        })
    };
    wait_until_requested(&h.transport, &url(KPI_PATH)).await;
    assert!(h.orchestrator.cancel(&key));

    let err = pending
        .await
        .expect("no panic")
        .expect_err("cancelled fetch fails");
    assert_eq!(err.abort_reason(), Some(AbortReason::Cancelled));
    assert!(h.orchestrator.cache().get(&key).is_none());
    assert_eq!(h.orchestrator.in_flight(), 0);
}

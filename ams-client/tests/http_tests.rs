//! End-to-end tests of the reqwest transport against a mock backend.

use ams_cache::{LmdbStore, MemoryStore, ReadSource};
use ams_client::{AmsClient, ClientConfig, StreamState};
use ams_core::{AgentEvent, AgentEventKind, AlarmQuery};
use ams_test_utils::{fixtures, sse};
use futures_util::StreamExt;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(base_url: &str) -> ClientConfig {
    let contents = format!(
        r#"
api_base_url = "{base_url}"
plant = "PVCI"
request_timeout_ms = 2000

[cache]
namespace = "ams.apiCache.v1:"
store_max_size_mb = 8
kpi_ttl_ms = 900000
records_ttl_ms = 0

[stream]
path = "/agent/stream"
idle_timeout_ms = 5000
"#
    );
    let config = ClientConfig::from_toml(&contents).expect("test config should parse");
    config.validate().expect("test config should validate");
    config
}

fn client(server: &MockServer) -> AmsClient {
    AmsClient::from_config(&config(&server.uri())).expect("client should build")
}

#[tokio::test]
async fn aggregate_endpoint_is_fetched_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/PVCI/kpis/overall"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::overall_kpis()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let query = AlarmQuery::new();
    let first = client.alarms().overall_kpis(&query).await.expect("first fetch");
    let second = client.alarms().overall_kpis(&query).await.expect("second fetch");

    assert_eq!(first.source(), ReadSource::Network);
    assert_eq!(second.source(), ReadSource::Memory);
    assert_eq!(second.value().total_alarms, 12840);
}

#[tokio::test]
async fn query_parameters_reach_the_backend() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/PVCI/bad-actors"))
        .and(query_param("top_n", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::bad_actors()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let actors = client
        .alarms()
        .bad_actors(&AlarmQuery::new().top_n(5))
        .await
        .expect("bad actors");
    assert_eq!(actors.value().bad_actors[0].source, "TI-101");
}

#[tokio::test]
async fn error_status_is_reported_and_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/PVCI/flood-windows"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    let query = AlarmQuery::new();
    for _ in 0..2 {
        let err = client
            .alarms()
            .flood_windows(&query)
            .await
            .expect_err("502 should fail");
        assert_eq!(err.status(), Some(502));
    }
    assert_eq!(client.cache().stats().memory_entries, 0);
}

#[tokio::test]
async fn lmdb_tier_serves_a_restarted_client() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/PVCI/breakdown/priority"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::priority_breakdown()))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let config = config(&server.uri());

    {
        let store = LmdbStore::open(dir.path(), 8).expect("store open should succeed");
        let client = AmsClient::with_parts(
            &config,
            Arc::new(ams_client::ReqwestTransport::new(&config).expect("transport")),
            Arc::new(store),
        );
        client
            .alarms()
            .priority_breakdown(&AlarmQuery::new())
            .await
            .expect("network fetch");
    }

    let store = LmdbStore::open(dir.path(), 8).expect("store reopen should succeed");
    let client = AmsClient::with_parts(
        &config,
        Arc::new(ams_client::ReqwestTransport::new(&config).expect("transport")),
        Arc::new(store),
    );
    let read = client
        .alarms()
        .priority_breakdown(&AlarmQuery::new())
        .await
        .expect("persisted read");
    assert_eq!(read.source(), ReadSource::Persistent);
}

#[tokio::test]
async fn regenerate_posts_plant_and_evicts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/PVCI/kpis/overall"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::overall_kpis()))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/PVCI/cache/regenerate"))
        .and(body_partial_json(serde_json::json!({ "plant": "PVCI" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::regenerate_accepted()))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server.uri());
    let client = AmsClient::with_parts(
        &config,
        Arc::new(ams_client::ReqwestTransport::new(&config).expect("transport")),
        Arc::new(MemoryStore::new()),
    );
    let query = AlarmQuery::new();
    client.alarms().overall_kpis(&query).await.expect("warm");
    client.alarms().regenerate().await.expect("regenerate");
    let after = client.alarms().overall_kpis(&query).await.expect("refetch");
    assert_eq!(after.source(), ReadSource::Network);
}

#[tokio::test]
async fn agent_stream_over_http() {
    let server = MockServer::start().await;
    let events = vec![
        AgentEvent::new(AgentEventKind::Reasoning).with_content("looking at TI-101"),
        AgentEvent::new(AgentEventKind::AnswerStream).with_content("TI-101 chattered"),
        AgentEvent::new(AgentEventKind::Complete),
    ];
    Mock::given(method("POST"))
        .and(path("/agent/stream"))
        .and(header("accept", "text/event-stream"))
        .and(body_partial_json(serde_json::json!({ "plant": "PVCI", "sessionId": "s-1" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse::body(&events).into_bytes(), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let mut stream = client.ask("why the flood?", "s-1").expect("ask should start");
    let mut received = Vec::new();
    while let Some(item) = stream.next().await {
        received.push(item.expect("event should decode"));
    }

    assert_eq!(received, events);
    assert_eq!(stream.finished().await, StreamState::Completed);
}

#[tokio::test]
async fn agent_stream_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/agent/stream"))
        .respond_with(ResponseTemplate::new(503).set_body_string("agent busy"))
        .mount(&server)
        .await;

    let client = client(&server);
    let mut stream = client.ask("why the flood?", "s-1").expect("ask should start");
    let err = stream
        .next()
        .await
        .expect("error item")
        .expect_err("503 should fail");

    assert_eq!(err.status(), Some(503));
    assert_eq!(stream.finished().await, StreamState::Errored);
}

//! AMS Test Utilities
//!
//! Shared test infrastructure for the AMS workspace:
//! - A scripted [`HttpTransport`] with per-URL call counters and a request gate
//! - SSE framing and chunk-splitting helpers
//! - Proptest generators for agent events and chunk boundaries
//! - Response fixtures for the alarm analytics endpoints

pub use ams_core::{
    AgentEvent, AgentEventKind, AgentQuery, AmsError, AmsResult, ByteStream, CacheKey,
    HttpResponse, HttpTransport, TransportError,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

// ============================================================================
// SCRIPTED TRANSPORT
// ============================================================================

/// A canned outcome for a buffered request.
#[derive(Debug, Clone)]
pub enum Scripted {
    Response(HttpResponse),
    Failure(AmsError),
}

/// How a scripted event stream behaves once its chunks run out.
#[derive(Debug, Clone)]
pub enum StreamEnd {
    /// The server closes the connection.
    Close,
    /// The connection stays open without sending anything.
    Hang,
    /// The connection drops with an error.
    Fail(AmsError),
}

#[derive(Debug, Clone)]
struct StreamScript {
    chunks: Vec<Bytes>,
    end: StreamEnd,
}

#[derive(Default)]
struct Routes {
    sticky: HashMap<String, Scripted>,
    queued: HashMap<String, VecDeque<Scripted>>,
    streams: HashMap<String, Result<StreamScript, AmsError>>,
}

/// [`HttpTransport`] answering from a script instead of the network.
///
/// URLs match exactly first, then by path with the query string removed.
/// Unscripted requests receive a 404. Every request is counted on arrival,
/// before the gate and any delay are applied.
pub struct ScriptedTransport {
    routes: Mutex<Routes>,
    calls: Mutex<HashMap<String, usize>>,
    posted: Mutex<Vec<(String, serde_json::Value)>>,
    chunks_delivered: Arc<AtomicUsize>,
    streams_dropped: Arc<AtomicUsize>,
    gate: watch::Sender<bool>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            routes: Mutex::new(Routes::default()),
            calls: Mutex::new(HashMap::new()),
            posted: Mutex::new(Vec::new()),
            chunks_delivered: Arc::new(AtomicUsize::new(0)),
            streams_dropped: Arc::new(AtomicUsize::new(0)),
            gate,
            delay: Mutex::new(None),
        }
    }

    /// Answer every request to `url` with `response`.
    pub fn respond(&self, url: impl Into<String>, response: HttpResponse) -> &Self {
        self.routes
            .lock()
            .expect("routes lock")
            .sticky
            .insert(url.into(), Scripted::Response(response));
        self
    }

    /// Answer every request to `url` with a 200 carrying `body`.
    pub fn respond_json(&self, url: impl Into<String>, body: serde_json::Value) -> &Self {
        self.respond(url, HttpResponse::ok_json(&body))
    }

    /// Answer the next request to `url` with `outcome`, ahead of any sticky response.
    pub fn respond_once(&self, url: impl Into<String>, outcome: Scripted) -> &Self {
        self.routes
            .lock()
            .expect("routes lock")
            .queued
            .entry(url.into())
            .or_default()
            .push_back(outcome);
        self
    }

    /// Fail every request to `url` with `error`.
    pub fn fail(&self, url: impl Into<String>, error: AmsError) -> &Self {
        self.routes
            .lock()
            .expect("routes lock")
            .sticky
            .insert(url.into(), Scripted::Failure(error));
        self
    }

    /// Serve `chunks` on the event stream at `url`, then behave as `end` says.
    pub fn stream(
        &self,
        url: impl Into<String>,
        chunks: impl IntoIterator<Item = impl Into<Bytes>>,
        end: StreamEnd,
    ) -> &Self {
        let script = StreamScript {
            chunks: chunks.into_iter().map(Into::into).collect(),
            end,
        };
        self.routes
            .lock()
            .expect("routes lock")
            .streams
            .insert(url.into(), Ok(script));
        self
    }

    /// Refuse to open the event stream at `url`.
    pub fn stream_error(&self, url: impl Into<String>, error: AmsError) -> &Self {
        self.routes
            .lock()
            .expect("routes lock")
            .streams
            .insert(url.into(), Err(error));
        self
    }

    /// Hold every request until [`open_gate`](Self::open_gate).
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    /// Delay every buffered response by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay lock") = Some(delay);
    }

    /// Number of requests made to exactly `url`.
    pub fn calls(&self, url: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().expect("calls lock").values().sum()
    }

    /// JSON bodies POSTed so far, in order.
    pub fn posted(&self) -> Vec<(String, serde_json::Value)> {
        self.posted.lock().expect("posted lock").clone()
    }

    /// Stream chunks handed to a consumer so far.
    pub fn chunks_delivered(&self) -> usize {
        self.chunks_delivered.load(Ordering::SeqCst)
    }

    /// Event streams whose consumer has released them.
    pub fn streams_dropped(&self) -> usize {
        self.streams_dropped.load(Ordering::SeqCst)
    }

    fn record_call(&self, url: &str) {
        *self
            .calls
            .lock()
            .expect("calls lock")
            .entry(url.to_string())
            .or_insert(0) += 1;
    }

    async fn wait_for_gate(&self) {
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
    }

    fn lookup<'a, V>(map: &'a HashMap<String, V>, url: &str) -> Option<&'a V> {
        map.get(url).or_else(|| {
            let path = url.split('?').next().unwrap_or(url);
            map.get(path)
        })
    }

    fn next_outcome(&self, url: &str) -> Scripted {
        let mut routes = self.routes.lock().expect("routes lock");
        let queued_key = if routes.queued.get(url).is_some_and(|q| !q.is_empty()) {
            Some(url.to_string())
        } else {
            let path = url.split('?').next().unwrap_or(url).to_string();
            routes
                .queued
                .get(&path)
                .is_some_and(|q| !q.is_empty())
                .then_some(path)
        };
        if let Some(key) = queued_key {
            if let Some(outcome) = routes.queued.get_mut(&key).and_then(VecDeque::pop_front) {
                return outcome;
            }
        }
        Self::lookup(&routes.sticky, url)
            .cloned()
            .unwrap_or_else(|| Scripted::Response(HttpResponse::new(404, "not scripted")))
    }

    async fn answer(&self, url: &str) -> AmsResult<HttpResponse> {
        self.record_call(url);
        self.wait_for_gate().await;
        let delay = *self.delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.next_outcome(url) {
            Scripted::Response(response) => Ok(response),
            Scripted::Failure(error) => Err(error),
        }
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts a stream as released when the consumer drops it.
struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, url: &str) -> AmsResult<HttpResponse> {
        self.answer(url).await
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> AmsResult<HttpResponse> {
        self.posted
            .lock()
            .expect("posted lock")
            .push((url.to_string(), body.clone()));
        self.answer(url).await
    }

    async fn open_event_stream(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> AmsResult<ByteStream> {
        self.record_call(url);
        self.posted
            .lock()
            .expect("posted lock")
            .push((url.to_string(), body.clone()));
        self.wait_for_gate().await;

        let script = {
            let routes = self.routes.lock().expect("routes lock");
            Self::lookup(&routes.streams, url).cloned()
        };
        let script = match script {
            Some(Ok(script)) => script,
            Some(Err(error)) => return Err(error),
            None => {
                return Err(AmsError::Transport(TransportError::Status {
                    url: url.to_string(),
                    status: 404,
                    body: "not scripted".to_string(),
                }))
            }
        };

        let delivered = Arc::clone(&self.chunks_delivered);
        let released = DropCounter(Arc::clone(&self.streams_dropped));
        let chunks = stream::iter(script.chunks).map(move |chunk| {
            let _held = &released;
            delivered.fetch_add(1, Ordering::SeqCst);
            Ok(chunk)
        });

        let tail = match script.end {
            StreamEnd::Close => stream::empty().boxed(),
            StreamEnd::Hang => stream::pending().boxed(),
            StreamEnd::Fail(error) => stream::once(async move { Err(error) }).boxed(),
        };
        Ok(chunks.chain(tail).boxed())
    }
}

// ============================================================================
// SSE HELPERS
// ============================================================================

pub mod sse {
    //! Building SSE bodies and splitting them into arbitrary chunks.

    use super::*;

    /// One SSE message carrying `event` as its `data:` field.
    pub fn frame(event: &AgentEvent) -> String {
        let json = serde_json::to_string(event).expect("agent events always serialize");
        format!("data: {}\n\n", json)
    }

    /// Concatenated SSE messages for `events`.
    pub fn body(events: &[AgentEvent]) -> String {
        events.iter().map(frame).collect()
    }

    /// Split `body` at each offset in `cuts` (sorted, deduplicated, clamped).
    pub fn split_at(body: &[u8], cuts: &[usize]) -> Vec<Bytes> {
        let mut points: Vec<usize> = cuts.iter().map(|c| (*c).min(body.len())).collect();
        points.sort_unstable();
        points.dedup();

        let mut chunks = Vec::with_capacity(points.len() + 1);
        let mut start = 0;
        for point in points {
            if point > start {
                chunks.push(Bytes::copy_from_slice(&body[start..point]));
                start = point;
            }
        }
        if start < body.len() {
            chunks.push(Bytes::copy_from_slice(&body[start..]));
        }
        chunks
    }

    /// `body` delivered one byte per chunk.
    pub fn bytewise(body: &[u8]) -> Vec<Bytes> {
        body.iter().map(|b| Bytes::copy_from_slice(&[*b])).collect()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for agent stream types.

    use super::*;
    use proptest::prelude::*;

    /// Every kind except `complete`.
    pub fn arb_non_terminal_kind() -> impl Strategy<Value = AgentEventKind> {
        prop_oneof![
            Just(AgentEventKind::Reasoning),
            Just(AgentEventKind::AnswerStream),
            Just(AgentEventKind::ToolCall),
            Just(AgentEventKind::ToolCallUpdate),
            Just(AgentEventKind::ToolResult),
            Just(AgentEventKind::AnswerComplete),
            Just(AgentEventKind::Error),
        ]
    }

    /// Text that exercises multi-byte UTF-8 and SSE-significant characters.
    pub fn arb_content() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-zA-Z0-9 .,:]{0,40}",
            Just("data: not a field".to_string()),
            Just("line one\nline two".to_string()),
            Just("température élevée ⚠".to_string()),
        ]
    }

    pub fn arb_agent_event() -> impl Strategy<Value = AgentEvent> {
        (
            arb_non_terminal_kind(),
            proptest::option::of(arb_content()),
            proptest::option::of(any::<u32>()),
        )
            .prop_map(|(kind, content, data)| {
                let mut event = AgentEvent::new(kind);
                event.content = content;
                event.data = data.map(|n| serde_json::json!({ "n": n }));
                event
            })
    }

    /// A non-terminal event sequence followed by `complete`.
    pub fn arb_session() -> impl Strategy<Value = Vec<AgentEvent>> {
        prop::collection::vec(arb_agent_event(), 0..12).prop_map(|mut events| {
            events.push(AgentEvent::new(AgentEventKind::Complete));
            events
        })
    }

    /// Up to `max_cuts` cut offsets in `0..=len`.
    pub fn arb_cuts(len: usize, max_cuts: usize) -> impl Strategy<Value = Vec<usize>> {
        prop::collection::vec(0..=len, 0..=max_cuts)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Canned backend payloads.

    use serde_json::{json, Value};

    pub const PLANT: &str = "PVCI";
    pub const BASE_URL: &str = "http://backend.test";

    /// Absolute URL for an API path.
    pub fn url(path: &str) -> String {
        format!("{}{}", BASE_URL, path)
    }

    pub fn overall_kpis() -> Value {
        json!({
            "plant": PLANT,
            "total_alarms": 12840,
            "avg_alarms_per_hour": 17.8,
            "avg_alarms_per_10min": 2.97,
            "flood_percentage": 4.2,
            "peak_alarms_per_10min": 61,
            "standing_alarms": 12,
            "chattering_alarms": 3
        })
    }

    pub fn per_source_kpis() -> Value {
        json!({
            "plant": PLANT,
            "sources": [
                { "source": "TI-101", "total_alarms": 940, "flood_count": 7 },
                { "source": "PI-220", "total_alarms": 512, "flood_count": 2, "unhealthy_percentage": 3.5 }
            ]
        })
    }

    pub fn flood_windows() -> Value {
        json!({
            "plant": PLANT,
            "threshold": 10,
            "windows": [{
                "start": "2025-01-01T08:00:00Z",
                "end": "2025-01-01T08:30:00Z",
                "alarm_count": 88,
                "peak_rate_per_10min": 41.0,
                "top_sources": [{ "source": "TI-101", "count": 30 }]
            }]
        })
    }

    pub fn bad_actors() -> Value {
        json!({
            "plant": PLANT,
            "bad_actors": [
                { "source": "TI-101", "count": 940, "share": 7.3, "top_condition": "HI" }
            ]
        })
    }

    pub fn priority_breakdown() -> Value {
        json!({
            "plant": PLANT,
            "priorities": [
                { "name": "High", "count": 300, "percentage": 30.0 },
                { "name": "Low", "count": 700, "percentage": 70.0 }
            ]
        })
    }

    pub fn condition_breakdown() -> Value {
        json!({
            "plant": PLANT,
            "conditions": [
                { "name": "HI", "count": 410, "percentage": 41.0 },
                { "name": "LO", "count": 590, "percentage": 59.0 }
            ]
        })
    }

    pub fn alarm_page() -> Value {
        json!({
            "page": 1,
            "page_size": 2,
            "total": 2,
            "records": [
                { "event_time": "2025-01-01T08:01:00Z", "source": "TI-101", "condition": "HI", "priority": "High" },
                { "event_time": "2025-01-01T08:02:00Z", "source": "PI-220", "condition": "LO" }
            ]
        })
    }

    pub fn regenerate_accepted() -> Value {
        json!({ "status": "ok", "message": "cache regenerated", "version": "2025-01-01T09:00:00Z" })
    }
}

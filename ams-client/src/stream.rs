//! Agent event streaming over SSE.
//!
//! [`StreamClient::ask`] POSTs an [`AgentQuery`] and returns an
//! [`AgentStream`]: an ordered, cancellable sequence of [`AgentEvent`]s.
//! A background session task owns the byte stream, so the connection is
//! released on every exit path: `complete`, transport error, end of body,
//! abort, idle timeout, or the consumer dropping the stream.
//!
//! Aborts are not failures. They end the sequence without an error item
//! and are reported through [`StreamState::Aborted`].

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use ams_core::{
    AbortReason, AgentEvent, AgentQuery, AmsError, AmsResult, ByteStream, HttpTransport,
};
use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::sse::{SseDecoder, SseMessage};

const EVENT_BUFFER: usize = 64;

/// Lifecycle of one stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    /// At least one chunk has arrived.
    Streaming,
    /// `complete` was received or the server closed the body.
    Completed,
    /// The transport failed; the error was yielded as the last item.
    Errored,
    Aborted(AbortReason),
}

impl StreamState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            StreamState::Completed | StreamState::Errored | StreamState::Aborted(_)
        )
    }
}

/// Cancels a stream session from anywhere.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.signal.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.signal.borrow()
    }
}

/// Ordered agent events for one query.
///
/// Dropping the stream aborts the session.
pub struct AgentStream {
    events: mpsc::Receiver<AmsResult<AgentEvent>>,
    state: watch::Receiver<StreamState>,
    abort: AbortHandle,
}

impl AgentStream {
    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<StreamState> {
        self.state.clone()
    }

    /// Wait until the session reaches a terminal state.
    pub async fn finished(&self) -> StreamState {
        let mut state = self.state.clone();
        let finished = state
            .wait_for(StreamState::is_finished)
            .await
            .map(|state| *state);
        match finished {
            Ok(finished) => finished,
            Err(_) => *state.borrow(),
        }
    }
}

impl Stream for AgentStream {
    type Item = AmsResult<AgentEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.abort.is_aborted() {
            return Poll::Ready(None);
        }
        self.events.poll_recv(cx)
    }
}

impl Drop for AgentStream {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

impl std::fmt::Debug for AgentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentStream")
            .field("state", &self.state())
            .finish()
    }
}

/// Opens agent streams against one endpoint.
#[derive(Clone)]
pub struct StreamClient {
    transport: Arc<dyn HttpTransport>,
    url: String,
    idle_timeout: Option<Duration>,
}

impl StreamClient {
    pub fn new(transport: Arc<dyn HttpTransport>, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
            idle_timeout: None,
        }
    }

    /// Abort with [`AbortReason::Timeout`] when no chunk arrives for `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start a session for `query`. Must be called within a tokio runtime.
    pub fn ask(&self, query: &AgentQuery) -> AmsResult<AgentStream> {
        let body = serde_json::to_value(query)?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (state_tx, state_rx) = watch::channel(StreamState::Idle);
        let (abort_tx, abort_rx) = watch::channel(false);

        let session = Session {
            transport: Arc::clone(&self.transport),
            url: self.url.clone(),
            request_id: query.request_id.clone(),
            idle_timeout: self.idle_timeout,
            events: events_tx,
            state: state_tx,
            abort: abort_rx,
        };
        tokio::spawn(session.run(body));

        Ok(AgentStream {
            events: events_rx,
            state: state_rx,
            abort: AbortHandle {
                signal: Arc::new(abort_tx),
            },
        })
    }
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("url", &self.url)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

/// How the read loop ended.
enum Exit {
    Completed,
    Errored(AmsError),
    Aborted(AbortReason),
    /// The consumer went away; nobody is left to tell.
    Detached,
}

struct Session {
    transport: Arc<dyn HttpTransport>,
    url: String,
    request_id: String,
    idle_timeout: Option<Duration>,
    events: mpsc::Sender<AmsResult<AgentEvent>>,
    state: watch::Sender<StreamState>,
    abort: watch::Receiver<bool>,
}

impl Session {
    async fn run(mut self, body: serde_json::Value) {
        info!(request_id = %self.request_id, url = %self.url, "agent stream starting");
        self.state.send_replace(StreamState::Connecting);

        let exit = match self.open(&body).await {
            Ok(stream) => self.read(stream).await,
            Err(exit) => exit,
        };

        let final_state = match exit {
            Exit::Completed => StreamState::Completed,
            Exit::Errored(error) => {
                warn!(request_id = %self.request_id, error = %error, "agent stream failed");
                match self.deliver(Err(error)).await {
                    Some(Exit::Aborted(reason)) => StreamState::Aborted(reason),
                    _ => StreamState::Errored,
                }
            }
            Exit::Aborted(reason) => {
                info!(request_id = %self.request_id, reason = %reason, "agent stream aborted");
                StreamState::Aborted(reason)
            }
            Exit::Detached => StreamState::Aborted(AbortReason::Cancelled),
        };
        self.state.send_replace(final_state);
        debug!(request_id = %self.request_id, state = ?final_state, "agent stream finished");
    }

    async fn open(&mut self, body: &serde_json::Value) -> Result<ByteStream, Exit> {
        let transport = Arc::clone(&self.transport);
        let open = transport.open_event_stream(&self.url, body);
        tokio::select! {
            biased;
            _ = aborted(&mut self.abort) => Err(Exit::Aborted(AbortReason::Cancelled)),
            result = open => result.map_err(Exit::Errored),
        }
    }

    async fn read(&mut self, mut stream: ByteStream) -> Exit {
        let mut decoder = SseDecoder::new();
        let mut streaming = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = aborted(&mut self.abort) => return Exit::Aborted(AbortReason::Cancelled),
                next = next_chunk(&mut stream, self.idle_timeout) => next,
            };

            let chunk = match next {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(error))) => return Exit::Errored(error),
                Ok(None) => {
                    if decoder.finish() {
                        debug!(request_id = %self.request_id, "discarding unterminated trailing block");
                    }
                    return Exit::Completed;
                }
                Err(reason) => return Exit::Aborted(reason),
            };

            if !streaming {
                streaming = true;
                self.state.send_replace(StreamState::Streaming);
            }

            for message in decoder.push(&chunk) {
                let Some(event) = self.decode(&message) else {
                    continue;
                };
                let terminal = event.is_terminal();
                if let Some(exit) = self.deliver(Ok(event)).await {
                    return exit;
                }
                if terminal {
                    debug!(request_id = %self.request_id, "complete received, releasing reader");
                    return Exit::Completed;
                }
            }
        }
    }

    /// Hand `item` to the consumer. A full buffer still yields to an abort.
    async fn deliver(&mut self, item: AmsResult<AgentEvent>) -> Option<Exit> {
        tokio::select! {
            biased;
            _ = aborted(&mut self.abort) => Some(Exit::Aborted(AbortReason::Cancelled)),
            sent = self.events.send(item) => sent.err().map(|_| Exit::Detached),
        }
    }

    /// Parse one message. Malformed payloads are logged and skipped.
    fn decode(&self, message: &SseMessage) -> Option<AgentEvent> {
        match serde_json::from_str::<AgentEvent>(&message.data) {
            Ok(event) => Some(event),
            Err(e) => {
                let error = AmsError::stream_protocol(e);
                warn!(
                    request_id = %self.request_id,
                    error = %error,
                    data_len = message.data.len(),
                    "skipping malformed stream block"
                );
                None
            }
        }
    }
}

/// Resolves once the abort flag is set. Never resolves if every handle is gone.
async fn aborted(abort: &mut watch::Receiver<bool>) {
    let closed = abort.wait_for(|flag| *flag).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

async fn next_chunk(
    stream: &mut ByteStream,
    idle_timeout: Option<Duration>,
) -> Result<Option<AmsResult<bytes::Bytes>>, AbortReason> {
    match idle_timeout {
        Some(idle) => tokio::time::timeout(idle, stream.next())
            .await
            .map_err(|_| AbortReason::Timeout),
        None => Ok(stream.next().await),
    }
}

//! Agent chat protocol types.
//!
//! The agent endpoint answers a POSTed [`AgentQuery`] with a stream of
//! [`AgentEvent`] messages, one JSON object per SSE `data:` field.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminator of an agent event (`"type"` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventKind {
    /// Intermediate chain-of-thought text.
    Reasoning,
    /// A partial chunk of the final answer.
    AnswerStream,
    /// The agent invoked a tool.
    ToolCall,
    /// Progress on a running tool call.
    ToolCallUpdate,
    /// A tool returned.
    ToolResult,
    /// The answer text is finished.
    AnswerComplete,
    /// The session is finished; nothing useful follows.
    Complete,
    /// Server-side failure reported in-band.
    Error,
}

/// One streamed message from the agent.
///
/// Every kind carries a partial payload: text in `content`, structured
/// tool data in `data`, failures in `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub kind: AgentEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plant: Option<String>,
}

impl AgentEvent {
    pub fn new(kind: AgentEventKind) -> Self {
        Self {
            kind,
            content: None,
            data: None,
            message: None,
            session_id: None,
            request_id: None,
            plant: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// `complete` ends the logical session even if the transport stays open.
    pub fn is_terminal(&self) -> bool {
        self.kind == AgentEventKind::Complete
    }

    /// Human-readable text carried by this event, if any.
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().or(self.message.as_deref())
    }
}

/// Body of the agent stream request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentQuery {
    pub query: String,
    pub plant: String,
    pub session_id: String,
    pub request_id: String,
}

impl AgentQuery {
    /// Build a query with a fresh request id.
    pub fn new(
        query: impl Into<String>,
        plant: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            plant: plant.into(),
            session_id: session_id.into(),
            request_id: Uuid::now_v7().to_string(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

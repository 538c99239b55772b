//! Agent-level streaming events.
//!
//! `AgentStreamEvent` wraps provider-level stream chunks into higher-level
//! events that the gateway forwards to clients over SSE.

use conclave_core::response::AgentResponse;
use serde::{Deserialize, Serialize};

/// Events emitted by an agent during streaming execution.
///
/// - `chunk`       — partial text from the model
/// - `tool_call`   — the agent is invoking a tool
/// - `tool_result` — tool execution completed
/// - `done`        — final, validated response
/// - `error`       — a safe error description
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    Chunk { content: String },

    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// The stream is complete. The response has been through the validation hook.
    Done { response: AgentResponse },

    Error { message: String },
}

impl AgentStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

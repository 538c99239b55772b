//! `AgentResponse` — the value every agent and network call returns.

use serde::{Deserialize, Serialize};

/// Text shown to end users when an invocation failed in a way they cannot fix.
pub const APOLOGY_TEXT: &str =
    "I'm sorry, I wasn't able to produce an answer this time. Please try again in a moment.";

/// Text shown when a network could not get a usable answer from its roster.
pub const ROUTING_APOLOGY_TEXT: &str =
    "I'm sorry, I couldn't coordinate an answer for that request. Please try again later.";

/// Output of an agent or network invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Prose answer
    #[serde(default)]
    pub text: String,

    /// Structured answer, when the model produced one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<serde_json::Value>,

    /// Safe, categorised error description; never a raw provider payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Thread the exchange was recorded on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    /// Free-form metadata (answering agent, network name, timestamps, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl AgentResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn object(value: serde_json::Value) -> Self {
        Self {
            object: Some(value),
            ..Self::default()
        }
    }

    /// A response with nothing in it.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A user-safe apology carrying an error description.
    pub fn apology(error: impl Into<String>) -> Self {
        Self {
            text: APOLOGY_TEXT.into(),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// Whether the structured part carries anything (`null`, `{}`, `[]` and `""` do not).
    pub fn has_object(&self) -> bool {
        match &self.object {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Object(map)) => !map.is_empty(),
            Some(serde_json::Value::Array(items)) => !items.is_empty(),
            Some(serde_json::Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// Neither text nor a structured object.
    pub fn is_empty(&self) -> bool {
        !self.has_text() && !self.has_object()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

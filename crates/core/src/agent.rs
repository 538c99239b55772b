//! Authored agent configuration.
//!
//! `AgentConfig` records are the only artifacts the core reads from
//! configuration. They are deserialized from `[[agents]]` tables at startup
//! and never change afterwards.

use serde::{Deserialize, Serialize};

/// Declarative description of one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique identifier within a config set
    pub id: String,

    /// Display name
    pub name: String,

    /// Free-text instructions (becomes the system message)
    pub instructions: String,

    /// What this agent is for; network routers show this to the model
    #[serde(default)]
    pub description: String,

    /// Model parameters
    #[serde(default)]
    pub model: ModelParams,

    /// Tool identifiers this agent needs
    #[serde(default)]
    pub tools: Vec<String>,

    /// Optional response-validation policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_validation: Option<ValidationPolicy>,
}

impl AgentConfig {
    /// Minimal config with the given identity; mostly useful in tests.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            instructions: instructions.into(),
            description: String::new(),
            model: ModelParams::default(),
            tools: Vec::new(),
            response_validation: None,
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.model.provider = provider.into();
        self.model.model = model.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_validation(mut self, policy: ValidationPolicy) -> Self {
        self.response_validation = Some(policy);
        self
    }

    /// The routing purpose: the description, or the name when none was authored.
    pub fn purpose(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.name
        } else {
            &self.description
        }
    }
}

/// Which model an agent talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "crate::provider::default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: crate::provider::default_temperature(),
            max_tokens: None,
        }
    }
}

/// Authored knobs for the response-validation hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    /// Answers shorter than this (in characters) get an elaboration offer appended
    #[serde(default = "default_min_response_length")]
    pub min_response_length: usize,

    /// Total generation attempts when the model returns nothing
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

pub const DEFAULT_MIN_RESPONSE_LENGTH: usize = 10;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

fn default_min_response_length() -> usize {
    DEFAULT_MIN_RESPONSE_LENGTH
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            min_response_length: DEFAULT_MIN_RESPONSE_LENGTH,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

//! Error types for the Conclave domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Construction-time failures (`BuildError`) are fatal for the agent being
//! built; runtime failures (`InvocationError`) are converted into safe
//! responses before they reach a caller.

use thiserror::Error;

/// The top-level error type for all Conclave operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Thread memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Agent construction ---
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    // --- Agent invocation ---
    #[error("Invocation error: {0}")]
    Invocation(#[from] InvocationError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures while turning an `AgentConfig` into a runnable agent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Invalid agent configuration: field '{field}' {reason}")]
    Configuration { field: String, reason: String },

    #[error("Agent '{agent_id}' requires unregistered tools: {}", missing.join(", "))]
    MissingTools {
        agent_id: String,
        missing: Vec<String>,
    },

    #[error("Provider '{provider}' is not usable: {reason}")]
    ProviderConfiguration { provider: String, reason: String },
}

impl BuildError {
    /// A configuration error for an empty required field.
    pub fn empty_field(field: &str) -> Self {
        Self::Configuration {
            field: field.to_string(),
            reason: "must not be empty".into(),
        }
    }
}

/// Failures while invoking an agent or a network.
#[derive(Debug, Clone, Error)]
pub enum InvocationError {
    #[error("Request must contain at least one message")]
    EmptyMessages,

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    #[error("Empty response after {attempts} attempts")]
    EmptyResponse { attempts: u32 },

    #[error("Routing failed in network '{network}': {reason}")]
    Routing { network: String, reason: String },

    #[error("Tool '{tool_id}' failed for agent '{agent_id}': {reason}")]
    ToolExecution {
        agent_id: String,
        tool_id: String,
        reason: String,
    },

    #[error("Model call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Model call failed: {0}")]
    Model(String),
}

impl InvocationError {
    /// Whether this error is the caller's fault (maps to HTTP 4xx).
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyMessages | Self::UnknownAgent(_) | Self::UnknownNetwork(_)
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Invalid resource id: {0}")]
    InvalidResource(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

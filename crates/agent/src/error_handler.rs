//! Conversion of runtime failures into user-safe responses.

use std::sync::Arc;

use chrono::Utc;
use conclave_core::error::{Error, InvocationError, ProviderError};
use conclave_core::event::{DomainEvent, EventBus};
use conclave_core::response::{AgentResponse, ROUTING_APOLOGY_TEXT};
use tracing::error;

/// Where a runtime failure happened.
#[derive(Debug, Clone, Copy)]
pub struct ErrorContext<'a> {
    pub agent_id: &'a str,
    pub tool_id: Option<&'a str>,
    pub thread_id: Option<&'a str>,
}

impl<'a> ErrorContext<'a> {
    pub fn agent(agent_id: &'a str) -> Self {
        Self {
            agent_id,
            tool_id: None,
            thread_id: None,
        }
    }

    pub fn with_tool(mut self, tool_id: &'a str) -> Self {
        self.tool_id = Some(tool_id);
        self
    }

    pub fn with_thread(mut self, thread_id: Option<&'a str>) -> Self {
        self.thread_id = thread_id;
        self
    }
}

/// Turns a runtime error into the response the caller sees.
///
/// Implementations must log the original error and must not copy raw
/// provider payloads into the returned response.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, context: ErrorContext<'_>, error: &Error) -> AgentResponse;
}

/// The default handler: log, publish `ErrorOccurred`, apologise with a category.
#[derive(Default)]
pub struct SafeErrorHandler {
    events: Option<Arc<EventBus>>,
}

impl SafeErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }
}

impl ErrorHandler for SafeErrorHandler {
    fn handle(&self, context: ErrorContext<'_>, err: &Error) -> AgentResponse {
        error!(
            agent_id = context.agent_id,
            tool_id = context.tool_id.unwrap_or("-"),
            thread_id = context.thread_id.unwrap_or("-"),
            error = %err,
            "Agent invocation failed"
        );
        publish_error(self.events.as_deref(), context.agent_id, err);
        AgentResponse::apology(categorize(err))
    }
}

/// Handler used by network routers: every failure reads "Routing failed".
pub struct RoutingErrorHandler {
    network: String,
    events: Option<Arc<EventBus>>,
}

impl RoutingErrorHandler {
    pub const ERROR: &'static str = "Routing failed";

    pub fn new(network: impl Into<String>, events: Option<Arc<EventBus>>) -> Self {
        Self {
            network: network.into(),
            events,
        }
    }
}

impl ErrorHandler for RoutingErrorHandler {
    fn handle(&self, context: ErrorContext<'_>, err: &Error) -> AgentResponse {
        error!(
            network = %self.network,
            tool_id = context.tool_id.unwrap_or("-"),
            thread_id = context.thread_id.unwrap_or("-"),
            error = %err,
            "Routing failed"
        );
        publish_error(self.events.as_deref(), &self.network, err);
        AgentResponse {
            text: ROUTING_APOLOGY_TEXT.into(),
            error: Some(Self::ERROR.into()),
            ..AgentResponse::default()
        }
    }
}

fn publish_error(events: Option<&EventBus>, context: &str, err: &Error) {
    if let Some(events) = events {
        events.publish(DomainEvent::ErrorOccurred {
            context: context.to_string(),
            error_message: err.to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// A short, safe description of an error.
pub fn categorize(err: &Error) -> &'static str {
    match err {
        Error::Provider(ProviderError::RateLimited { .. }) => "Model provider is rate limiting requests",
        Error::Provider(ProviderError::AuthenticationFailed(_)) => "Model provider rejected credentials",
        Error::Provider(ProviderError::Timeout(_)) => "Model request timed out",
        Error::Provider(_) => "Model provider unavailable",
        Error::Tool(_) => "Tool execution failed",
        Error::Memory(_) => "Conversation memory unavailable",
        Error::Invocation(InvocationError::ToolExecution { .. }) => "Tool execution failed",
        Error::Invocation(InvocationError::Timeout { .. }) => "Request timed out",
        Error::Invocation(InvocationError::Routing { .. }) => RoutingErrorHandler::ERROR,
        Error::Invocation(_) | Error::Build(_) | Error::Serialization(_) | Error::Internal(_) => {
            "Internal error"
        }
    }
}

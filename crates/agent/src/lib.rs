//! Agent runtime for Conclave.
//!
//! An [`Agent`] is an immutable bundle of instructions, a model handle, and
//! the exact set of tools it asked for. Every call runs through the
//! [`ResponseValidationHook`], so callers always get a non-empty
//! [`AgentResponse`](conclave_core::AgentResponse):
//!
//! 1. **Resolve** the memory thread (explicit id, or latest for the resource)
//! 2. **Build context** (instructions + thread history + new messages)
//! 3. **Call the model**, executing tool calls until it answers in text
//! 4. **Validate** the answer, retrying empty ones a bounded number of times
//! 5. **Record** the exchange on the thread
//!
//! A [`NetworkRouter`] puts a routing model in front of a roster of agents
//! and exposes each roster member to it as a tool.

pub mod agent;
pub mod error_handler;
pub mod factory;
pub mod hook;
pub mod network;
pub mod registry;
pub mod scoring;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use agent::{Agent, Completion, InvokeOptions, RuntimeLimits};
pub use error_handler::{ErrorContext, ErrorHandler, RoutingErrorHandler, SafeErrorHandler};
pub use factory::AgentFactory;
pub use hook::{HookOptions, ResponseValidationHook, Verdict};
pub use network::{NetworkRouter, RouteOutcome, RouteState, RoutingFallback};
pub use registry::{AgentRegistry, InvokeRequest};
pub use stream_event::AgentStreamEvent;

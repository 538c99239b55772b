//! # Conclave Core
//!
//! Domain types, traits, and error definitions for the Conclave multi-agent
//! runtime. This crate has **no framework dependencies**: it defines the
//! model that the provider, memory, agent and gateway crates implement
//! against.
//!
//! ## Layout
//!
//! - [`tool`] — the `Tool` capability trait and the `ToolRegistry`
//! - [`provider`] — the opaque model capability (`Provider`) and `ModelHandle`
//! - [`agent`] — authored `AgentConfig` records
//! - [`response`] — `AgentResponse`, the only value that leaves the core
//! - [`thread`] — `MemoryThread` and the `ThreadStore` persistence seam
//! - [`event`] — broadcast bus for domain events
//! - [`error`] — the error taxonomy

pub mod agent;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod response;
pub mod thread;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentConfig, ModelParams, ValidationPolicy};
pub use error::{BuildError, Error, InvocationError, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, Role};
pub use provider::{ModelHandle, Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use response::AgentResponse;
pub use thread::{MemoryThread, ThreadId, ThreadStore};
pub use tool::{Tool, ToolRegistry, ToolResolution, ToolResult};

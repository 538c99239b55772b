//! Domain event system — decoupled observation of agent activity.
//!
//! Events are published when something interesting happens. Subscribers
//! (the gateway, diagnostics, tests) react without coupling to the agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// An agent finished an invocation
    AgentInvoked {
        agent_id: String,
        thread_id: Option<String>,
        attempts: u32,
        success: bool,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed on behalf of an agent
    ToolExecuted {
        agent_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A memory thread was created
    ThreadCreated {
        thread_id: String,
        resource_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A network finished routing a task
    RouteCompleted {
        network: String,
        agents_invoked: Vec<String>,
        success: bool,
        timestamp: DateTime<Utc>,
    },

    /// An error was swallowed and converted into a safe response
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

//! Memory threads — stable conversational context identifiers.
//!
//! A thread belongs to a resource (typically a user id). Agents and
//! networks that are given the same thread see the same history.
//! The [`ThreadStore`] trait is the persistence seam; implementations live
//! in `conclave-memory`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MemoryError;
use crate::message::Message;

/// Opaque thread identifier. Callers must not parse it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A conversational context scoped to a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryThread {
    pub id: ThreadId,

    /// Owning resource (e.g. a user id)
    pub resource_id: String,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,

    pub last_used_at: DateTime<Utc>,

    /// Insertion sequence assigned by the store; breaks creation-time ties
    #[serde(default)]
    pub seq: u64,
}

impl MemoryThread {
    /// A fresh thread with a newly generated id. `seq` is assigned on insert.
    pub fn new(
        resource_id: impl Into<String>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ThreadId::new(),
            resource_id: resource_id.into(),
            metadata,
            created_at: now,
            last_used_at: now,
            seq: 0,
        }
    }

    /// Shallow merge: each key in `patch` overwrites the existing value.
    pub fn merge_metadata(&mut self, patch: serde_json::Map<String, serde_json::Value>) {
        for (key, value) in patch {
            self.metadata.insert(key, value);
        }
    }

    /// Ordering key for "most recent": creation time, then insertion order.
    pub fn recency_key(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.seq)
    }
}

/// Backing store for threads and their message history.
///
/// Implementations only need per-call atomicity; the thread manager
/// serializes get-or-create per resource on top of this trait.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// The store name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Insert a new thread, assigning its insertion sequence. Returns the stored thread.
    async fn insert(&self, thread: MemoryThread) -> Result<MemoryThread, MemoryError>;

    /// Replace an existing thread (matched by id).
    async fn update(&self, thread: MemoryThread) -> Result<(), MemoryError>;

    async fn get(&self, id: &ThreadId) -> Result<Option<MemoryThread>, MemoryError>;

    /// The most recent thread for a resource, by creation time then insertion order.
    async fn latest_for_resource(
        &self,
        resource_id: &str,
    ) -> Result<Option<MemoryThread>, MemoryError>;

    /// Every thread owned by a resource, oldest first.
    async fn list_for_resource(&self, resource_id: &str) -> Result<Vec<MemoryThread>, MemoryError>;

    /// Append messages to a thread's history.
    async fn append_messages(
        &self,
        id: &ThreadId,
        messages: Vec<Message>,
    ) -> Result<(), MemoryError>;

    /// The last `limit` messages of a thread, oldest first.
    async fn recent_messages(
        &self,
        id: &ThreadId,
        limit: usize,
    ) -> Result<Vec<Message>, MemoryError>;
}

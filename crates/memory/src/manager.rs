//! Thread manager — maps resources to stable conversation threads.
//!
//! All mutations for a resource run under that resource's async mutex, so
//! two concurrent `get_or_create_thread` calls never mint two threads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use conclave_core::error::MemoryError;
use conclave_core::event::{DomainEvent, EventBus};
use conclave_core::message::Message;
use conclave_core::thread::{MemoryThread, ThreadId, ThreadStore};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::in_memory::InMemoryThreadStore;

type ResourceLock = Arc<tokio::sync::Mutex<()>>;

/// Explicitly constructed thread service shared by agents and networks.
pub struct ThreadManager {
    store: Arc<dyn ThreadStore>,
    locks: Mutex<HashMap<String, ResourceLock>>,
    events: Option<Arc<EventBus>>,
}

impl ThreadManager {
    pub fn new(store: Arc<dyn ThreadStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
            events: None,
        }
    }

    /// A manager over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryThreadStore::new()))
    }

    /// Publish `ThreadCreated` events on the given bus.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    fn resource_lock(&self, resource_id: &str) -> ResourceLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(resource_id.to_string()).or_default().clone()
    }

    /// Return the most recent thread for `resource_id`, creating one if none exists.
    ///
    /// Supplied metadata is shallow-merged into an existing thread.
    pub async fn get_or_create_thread(
        &self,
        resource_id: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<MemoryThread, MemoryError> {
        validate_resource(resource_id)?;
        let lock = self.resource_lock(resource_id);
        let _guard = lock.lock().await;

        match self.store.latest_for_resource(resource_id).await? {
            Some(mut thread) => {
                if let Some(patch) = metadata {
                    thread.merge_metadata(patch);
                }
                thread.last_used_at = Utc::now();
                self.store.update(thread.clone()).await?;
                debug!(thread_id = %thread.id, resource_id, "Reusing thread");
                Ok(thread)
            }
            None => {
                self.insert(MemoryThread::new(resource_id, metadata.unwrap_or_default()))
                    .await
            }
        }
    }

    /// Always create a new thread; it becomes the resource's most recent one.
    pub async fn create_thread(
        &self,
        resource_id: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<MemoryThread, MemoryError> {
        validate_resource(resource_id)?;
        let lock = self.resource_lock(resource_id);
        let _guard = lock.lock().await;
        self.insert(MemoryThread::new(resource_id, metadata.unwrap_or_default()))
            .await
    }

    pub async fn get_most_recent_thread(
        &self,
        resource_id: &str,
    ) -> Result<Option<MemoryThread>, MemoryError> {
        validate_resource(resource_id)?;
        self.store.latest_for_resource(resource_id).await
    }

    pub async fn get_thread(&self, id: &ThreadId) -> Result<Option<MemoryThread>, MemoryError> {
        self.store.get(id).await
    }

    pub async fn list_threads(&self, resource_id: &str) -> Result<Vec<MemoryThread>, MemoryError> {
        validate_resource(resource_id)?;
        self.store.list_for_resource(resource_id).await
    }

    /// Shallow-merge `patch` into a thread's metadata, last write wins per key.
    pub async fn update_metadata(
        &self,
        id: &ThreadId,
        patch: Map<String, Value>,
    ) -> Result<MemoryThread, MemoryError> {
        let resource_id = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| MemoryError::ThreadNotFound(id.to_string()))?
            .resource_id;

        let lock = self.resource_lock(&resource_id);
        let _guard = lock.lock().await;

        // Re-read under the lock so concurrent patches all land
        let mut thread = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| MemoryError::ThreadNotFound(id.to_string()))?;
        thread.merge_metadata(patch);
        thread.last_used_at = Utc::now();
        self.store.update(thread.clone()).await?;
        Ok(thread)
    }

    /// Resolve the thread an invocation should record on.
    ///
    /// An explicit thread id wins; an unknown id is created for the given
    /// resource. Without a thread id the resource's thread is fetched or
    /// created. With neither the call is stateless.
    pub async fn resolve(
        &self,
        thread_id: Option<&ThreadId>,
        resource_id: Option<&str>,
    ) -> Result<Option<MemoryThread>, MemoryError> {
        match (thread_id, resource_id) {
            (Some(id), resource) => {
                if let Some(thread) = self.store.get(id).await? {
                    return Ok(Some(thread));
                }
                let resource = resource.ok_or_else(|| MemoryError::ThreadNotFound(id.to_string()))?;
                validate_resource(resource)?;
                let lock = self.resource_lock(resource);
                let _guard = lock.lock().await;
                if let Some(thread) = self.store.get(id).await? {
                    return Ok(Some(thread));
                }
                let thread = MemoryThread {
                    id: id.clone(),
                    ..MemoryThread::new(resource, Map::new())
                };
                self.insert(thread).await.map(Some)
            }
            (None, Some(resource)) => self.get_or_create_thread(resource, None).await.map(Some),
            (None, None) => Ok(None),
        }
    }

    pub async fn append_messages(
        &self,
        id: &ThreadId,
        messages: Vec<Message>,
    ) -> Result<(), MemoryError> {
        if messages.is_empty() {
            return Ok(());
        }
        self.store.append_messages(id, messages).await
    }

    pub async fn recent_messages(
        &self,
        id: &ThreadId,
        limit: usize,
    ) -> Result<Vec<Message>, MemoryError> {
        self.store.recent_messages(id, limit).await
    }

    async fn insert(&self, thread: MemoryThread) -> Result<MemoryThread, MemoryError> {
        let thread = self.store.insert(thread).await?;
        info!(thread_id = %thread.id, resource_id = %thread.resource_id, "Thread created");
        if let Some(events) = &self.events {
            events.publish(DomainEvent::ThreadCreated {
                thread_id: thread.id.to_string(),
                resource_id: thread.resource_id.clone(),
                timestamp: thread.created_at,
            });
        }
        Ok(thread)
    }
}

fn validate_resource(resource_id: &str) -> Result<(), MemoryError> {
    if resource_id.trim().is_empty() {
        return Err(MemoryError::InvalidResource(
            "resource id must not be empty".into(),
        ));
    }
    Ok(())
}

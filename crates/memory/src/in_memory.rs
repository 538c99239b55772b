//! In-memory thread store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use conclave_core::error::MemoryError;
use conclave_core::message::Message;
use conclave_core::thread::{MemoryThread, ThreadId, ThreadStore};
use tokio::sync::RwLock;

use crate::table::ThreadTable;

/// A thread store that keeps everything in process memory.
#[derive(Default)]
pub struct InMemoryThreadStore {
    table: RwLock<ThreadTable>,
}

impl InMemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThreadStore for InMemoryThreadStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert(&self, thread: MemoryThread) -> Result<MemoryThread, MemoryError> {
        self.table.write().await.insert(thread)
    }

    async fn update(&self, thread: MemoryThread) -> Result<(), MemoryError> {
        self.table.write().await.update(thread)
    }

    async fn get(&self, id: &ThreadId) -> Result<Option<MemoryThread>, MemoryError> {
        Ok(self.table.read().await.get(id))
    }

    async fn latest_for_resource(
        &self,
        resource_id: &str,
    ) -> Result<Option<MemoryThread>, MemoryError> {
        Ok(self.table.read().await.latest_for_resource(resource_id))
    }

    async fn list_for_resource(&self, resource_id: &str) -> Result<Vec<MemoryThread>, MemoryError> {
        Ok(self.table.read().await.list_for_resource(resource_id))
    }

    async fn append_messages(
        &self,
        id: &ThreadId,
        messages: Vec<Message>,
    ) -> Result<(), MemoryError> {
        self.table.write().await.append_messages(id, messages)
    }

    async fn recent_messages(
        &self,
        id: &ThreadId,
        limit: usize,
    ) -> Result<Vec<Message>, MemoryError> {
        Ok(self.table.read().await.recent_messages(id, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_get() {
        let store = InMemoryThreadStore::new();
        let thread = store
            .insert(MemoryThread::new("user-1", Default::default()))
            .await
            .unwrap();
        assert_eq!(thread.seq, 1);

        let fetched = store.get(&thread.id).await.unwrap().unwrap();
        assert_eq!(fetched.resource_id, "user-1");
        assert!(store.get(&ThreadId::from("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resources_are_isolated() {
        let store = InMemoryThreadStore::new();
        store
            .insert(MemoryThread::new("alice", Default::default()))
            .await
            .unwrap();
        assert!(store.latest_for_resource("bob").await.unwrap().is_none());
        assert_eq!(store.list_for_resource("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_keeps_sequence() {
        let store = InMemoryThreadStore::new();
        let mut thread = store
            .insert(MemoryThread::new("user-1", Default::default()))
            .await
            .unwrap();
        thread.seq = 99;
        thread.metadata.insert("k".into(), serde_json::json!("v"));
        store.update(thread.clone()).await.unwrap();

        let fetched = store.get(&thread.id).await.unwrap().unwrap();
        assert_eq!(fetched.seq, 1);
        assert_eq!(fetched.metadata["k"], "v");
    }
}

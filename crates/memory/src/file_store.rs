//! File-based thread store — persistent JSON-lines storage.
//!
//! Each line is one record: either a thread or a message appended to a
//! thread. Records are replayed in order on start and the whole table is
//! rewritten after every mutation.
//!
//! Storage location: `~/.conclave/threads.jsonl` unless configured.

use async_trait::async_trait;
use conclave_core::error::MemoryError;
use conclave_core::message::Message;
use conclave_core::thread::{MemoryThread, ThreadId, ThreadStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::table::ThreadTable;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record {
    Thread(MemoryThread),
    Message { thread_id: ThreadId, message: Message },
}

/// A file-backed thread store using JSONL.
///
/// Reads are served from memory; every mutation flushes the table to disk
/// before returning.
pub struct FileThreadStore {
    path: PathBuf,
    table: RwLock<ThreadTable>,
}

impl FileThreadStore {
    /// Open a store at the given path. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let table = load_from_disk(&path);
        debug!(
            path = %path.display(),
            threads = table.threads().len(),
            "File thread store loaded"
        );
        Self {
            path,
            table: RwLock::new(table),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, table: &ThreadTable) -> Result<(), MemoryError> {
        let mut content = String::new();
        let threads = table.threads().iter().cloned().map(Record::Thread);
        let messages = table.messages().map(|(id, m)| Record::Message {
            thread_id: id.clone(),
            message: m.clone(),
        });
        for record in threads.chain(messages) {
            let line = serde_json::to_string(&record)
                .map_err(|e| MemoryError::Storage(format!("Failed to serialize record: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MemoryError::Storage(format!("Failed to create thread directory: {e}"))
            })?;
        }
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to write thread file: {e}")))
    }
}

fn load_from_disk(path: &Path) -> ThreadTable {
    let mut table = ThreadTable::default();
    let Ok(content) = std::fs::read_to_string(path) else {
        return table;
    };

    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<Record>(line) {
            Ok(Record::Thread(thread)) => table.restore(thread),
            Ok(Record::Message { thread_id, message }) => {
                if let Err(e) = table.append_messages(&thread_id, vec![message]) {
                    warn!(error = %e, "Skipping message for unknown thread");
                }
            }
            Err(e) => warn!(error = %e, "Skipping corrupted thread record"),
        }
    }
    table
}

#[async_trait]
impl ThreadStore for FileThreadStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn insert(&self, thread: MemoryThread) -> Result<MemoryThread, MemoryError> {
        let mut table = self.table.write().await;
        let stored = table.insert(thread)?;
        self.flush(&table).await?;
        Ok(stored)
    }

    async fn update(&self, thread: MemoryThread) -> Result<(), MemoryError> {
        let mut table = self.table.write().await;
        table.update(thread)?;
        self.flush(&table).await
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
        let mut table = self.table.write().await;
        table.append_messages(id, messages)?;
        self.flush(&table).await
    }

    async fn recent_messages(
        &self,
        id: &ThreadId,
        limit: usize,
    ) -> Result<Vec<Message>, MemoryError> {
        Ok(self.table.read().await.recent_messages(id, limit))
    }
}

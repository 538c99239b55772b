//! Thread table shared by the in-memory and file stores.

use std::collections::HashMap;

use conclave_core::error::MemoryError;
use conclave_core::message::Message;
use conclave_core::thread::{MemoryThread, ThreadId};

#[derive(Debug, Default)]
pub(crate) struct ThreadTable {
    threads: Vec<MemoryThread>,
    messages: HashMap<ThreadId, Vec<Message>>,
    next_seq: u64,
}

impl ThreadTable {
    pub(crate) fn insert(&mut self, mut thread: MemoryThread) -> Result<MemoryThread, MemoryError> {
        if self.threads.iter().any(|t| t.id == thread.id) {
            return Err(MemoryError::Storage(format!(
                "Thread {} already exists",
                thread.id
            )));
        }
        self.next_seq += 1;
        thread.seq = self.next_seq;
        self.threads.push(thread.clone());
        Ok(thread)
    }

    /// Re-insert a thread read back from disk, keeping its sequence.
    pub(crate) fn restore(&mut self, thread: MemoryThread) {
        self.next_seq = self.next_seq.max(thread.seq);
        match self.threads.iter_mut().find(|t| t.id == thread.id) {
            Some(existing) => *existing = thread,
            None => self.threads.push(thread),
        }
    }

    pub(crate) fn update(&mut self, thread: MemoryThread) -> Result<(), MemoryError> {
        let existing = self
            .threads
            .iter_mut()
            .find(|t| t.id == thread.id)
            .ok_or_else(|| MemoryError::ThreadNotFound(thread.id.to_string()))?;
        let seq = existing.seq;
        *existing = MemoryThread { seq, ..thread };
        Ok(())
    }

    pub(crate) fn get(&self, id: &ThreadId) -> Option<MemoryThread> {
        self.threads.iter().find(|t| &t.id == id).cloned()
    }

    pub(crate) fn latest_for_resource(&self, resource_id: &str) -> Option<MemoryThread> {
        self.threads
            .iter()
            .filter(|t| t.resource_id == resource_id)
            .max_by_key(|t| t.recency_key())
            .cloned()
    }

    pub(crate) fn list_for_resource(&self, resource_id: &str) -> Vec<MemoryThread> {
        let mut threads: Vec<MemoryThread> = self
            .threads
            .iter()
            .filter(|t| t.resource_id == resource_id)
            .cloned()
            .collect();
        threads.sort_by_key(|t| t.recency_key());
        threads
    }

    pub(crate) fn append_messages(
        &mut self,
        id: &ThreadId,
        messages: Vec<Message>,
    ) -> Result<(), MemoryError> {
        if !self.threads.iter().any(|t| &t.id == id) {
            return Err(MemoryError::ThreadNotFound(id.to_string()));
        }
        self.messages.entry(id.clone()).or_default().extend(messages);
        Ok(())
    }

    pub(crate) fn recent_messages(&self, id: &ThreadId, limit: usize) -> Vec<Message> {
        let Some(history) = self.messages.get(id) else {
            return Vec::new();
        };
        let skip = history.len().saturating_sub(limit);
        history[skip..].to_vec()
    }

    pub(crate) fn threads(&self) -> &[MemoryThread] {
        &self.threads
    }

    pub(crate) fn messages(&self) -> impl Iterator<Item = (&ThreadId, &Message)> {
        self.messages
            .iter()
            .flat_map(|(id, msgs)| msgs.iter().map(move |m| (id, m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn seq_breaks_creation_time_ties() {
        let mut table = ThreadTable::default();
        let now = Utc::now();

        let mut first = MemoryThread::new("r", Default::default());
        first.created_at = now;
        let mut second = MemoryThread::new("r", Default::default());
        second.created_at = now;

        table.insert(first).unwrap();
        let second = table.insert(second).unwrap();
        assert_eq!(table.latest_for_resource("r").unwrap().id, second.id);
    }

    #[test]
    fn later_creation_time_wins_over_seq() {
        let mut table = ThreadTable::default();
        let mut newer = MemoryThread::new("r", Default::default());
        newer.created_at = Utc::now() + Duration::seconds(5);
        let newer = table.insert(newer).unwrap();
        table.insert(MemoryThread::new("r", Default::default())).unwrap();

        assert_eq!(table.latest_for_resource("r").unwrap().id, newer.id);
    }

    #[test]
    fn recent_messages_returns_tail_in_order() {
        let mut table = ThreadTable::default();
        let thread = table.insert(MemoryThread::new("r", Default::default())).unwrap();
        let msgs = (0..5).map(|i| Message::user(format!("m{i}"))).collect();
        table.append_messages(&thread.id, msgs).unwrap();

        let tail = table.recent_messages(&thread.id, 2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].content, "m3");
        assert_eq!(tail[1].content, "m4");
    }

    #[test]
    fn append_to_unknown_thread_fails() {
        let mut table = ThreadTable::default();
        let err = table
            .append_messages(&ThreadId::from("nope"), vec![Message::user("x")])
            .unwrap_err();
        assert!(matches!(err, MemoryError::ThreadNotFound(_)));
    }
}

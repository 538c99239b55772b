//! Conversation thread storage and the thread manager for Conclave.

pub mod file_store;
pub mod in_memory;
pub mod manager;
mod table;

pub use file_store::FileThreadStore;
pub use in_memory::InMemoryThreadStore;
pub use manager::ThreadManager;

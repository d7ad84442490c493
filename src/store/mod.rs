//! Durable storage for queued email messages.

mod backend;
mod factory;
mod memory_backend;
mod postgres_backend;

pub use backend::{MessageStore, QueueStats, StoreError};
pub use factory::create_message_store;
pub use memory_backend::MemoryMessageStore;
pub use postgres_backend::PostgresMessageStore;

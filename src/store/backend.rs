//! Storage abstraction for queued email messages.
//!
//! The queue processor only talks to [`MessageStore`], so the in-memory and
//! PostgreSQL backends are interchangeable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::email::{EmailMessage, EmailStatus};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend is temporarily unavailable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Message not found: {0}")]
    NotFound(Uuid),

    #[error("Message already stored: {0}")]
    Duplicate(Uuid),

    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted row could not be mapped back to a message
    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),
}

/// Point-in-time counts over the whole queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: u64,
    pub queued: u64,
    pub sent: u64,
    pub failed: u64,
    /// Failed messages that will be attempted again
    pub awaiting_retry: u64,
    /// Failed messages that will never be attempted again
    pub exhausted: u64,
    /// Messages the processor would pick up right now
    pub due: u64,
}

impl QueueStats {
    /// Fold one message into the counts.
    pub fn record(&mut self, message: &EmailMessage, now: DateTime<Utc>, max_retry_attempts: u32) {
        self.total += 1;
        match message.status {
            EmailStatus::Queued => self.queued += 1,
            EmailStatus::Sent => self.sent += 1,
            EmailStatus::Failed => {
                self.failed += 1;
                if message.is_terminal(max_retry_attempts) {
                    self.exhausted += 1;
                } else {
                    self.awaiting_retry += 1;
                }
            }
        }
        if message.is_due(now, max_retry_attempts) {
            self.due += 1;
        }
    }
}

/// Durable storage for email messages.
///
/// `update` is the commit boundary: a message's new state is only observable
/// once it returns `Ok`.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Messages eligible for an attempt at `now`, most urgent first, then
    /// oldest first. At most `batch_size` are returned.
    async fn fetch_due(
        &self,
        batch_size: usize,
        now: DateTime<Utc>,
        max_retry_attempts: u32,
    ) -> Result<Vec<EmailMessage>, StoreError>;

    async fn insert(&self, message: &EmailMessage) -> Result<(), StoreError>;

    async fn update(&self, message: &EmailMessage) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<EmailMessage>, StoreError>;

    async fn stats(
        &self,
        now: DateTime<Utc>,
        max_retry_attempts: u32,
    ) -> Result<QueueStats, StoreError>;

    /// Backend identifier for logs and the health endpoint
    fn backend_name(&self) -> &'static str;
}

//! In-memory message store using DashMap.
//!
//! Messages are lost on restart; intended for development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::email::EmailMessage;

use super::backend::{MessageStore, QueueStats, StoreError};

#[derive(Default)]
pub struct MemoryMessageStore {
    messages: DashMap<Uuid, EmailMessage>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Copy of every stored message, oldest first.
    pub fn snapshot(&self) -> Vec<EmailMessage> {
        let mut all: Vec<EmailMessage> = self.messages.iter().map(|m| m.value().clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn fetch_due(
        &self,
        batch_size: usize,
        now: DateTime<Utc>,
        max_retry_attempts: u32,
    ) -> Result<Vec<EmailMessage>, StoreError> {
        let mut due: Vec<EmailMessage> = self
            .messages
            .iter()
            .filter(|m| m.is_due(now, max_retry_attempts))
            .map(|m| m.value().clone())
            .collect();

        due.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        due.truncate(batch_size);
        Ok(due)
    }

    async fn insert(&self, message: &EmailMessage) -> Result<(), StoreError> {
        match self.messages.entry(message.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(message.id)),
            Entry::Vacant(slot) => {
                slot.insert(message.clone());
                tracing::trace!(email_id = %message.id, "Message stored in memory");
                Ok(())
            }
        }
    }

    async fn update(&self, message: &EmailMessage) -> Result<(), StoreError> {
        match self.messages.get_mut(&message.id) {
            Some(mut stored) => {
                *stored = message.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(message.id)),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<EmailMessage>, StoreError> {
        Ok(self.messages.get(&id).map(|m| m.value().clone()))
    }

    async fn stats(
        &self,
        now: DateTime<Utc>,
        max_retry_attempts: u32,
    ) -> Result<QueueStats, StoreError> {
        let mut stats = QueueStats::default();
        for message in self.messages.iter() {
            stats.record(message.value(), now, max_retry_attempts);
        }
        Ok(stats)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::{EmailDraft, EmailStatus, RetryPolicy};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn message(priority: i16, created: DateTime<Utc>) -> EmailMessage {
        let mut draft = EmailDraft::new(
            "events@example.org",
            vec!["sam@example.com".to_string()],
            "Hello",
        )
        .with_text("Hi");
        draft.priority = priority;
        EmailMessage::queue(draft, created).unwrap()
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates() {
        let store = MemoryMessageStore::new();
        let msg = message(5, now());

        store.insert(&msg).await.unwrap();
        assert!(matches!(
            store.insert(&msg).await,
            Err(StoreError::Duplicate(id)) if id == msg.id
        ));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_update_requires_existing_row() {
        let store = MemoryMessageStore::new();
        let mut msg = message(5, now());
        assert!(matches!(store.update(&msg).await, Err(StoreError::NotFound(_))));

        store.insert(&msg).await.unwrap();
        msg.mark_sent(None, now()).unwrap();
        store.update(&msg).await.unwrap();

        let stored = store.get(msg.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EmailStatus::Sent);
    }

    #[tokio::test]
    async fn test_fetch_due_orders_by_priority_then_age() {
        let store = MemoryMessageStore::new();
        let old_low = message(8, now());
        let new_high = message(1, now() + Duration::minutes(2));
        let old_high = message(1, now() + Duration::minutes(1));
        for m in [&old_low, &new_high, &old_high] {
            store.insert(m).await.unwrap();
        }

        let due = store.fetch_due(10, now() + Duration::hours(1), 3).await.unwrap();
        let ids: Vec<Uuid> = due.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![old_high.id, new_high.id, old_low.id]);

        let limited = store.fetch_due(2, now() + Duration::hours(1), 3).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_due_skips_waiting_and_terminal_messages() {
        let store = MemoryMessageStore::new();
        let policy = RetryPolicy::default();

        let queued = message(5, now());
        let mut waiting = message(5, now());
        waiting
            .record_failure("timeout", true, &policy, now())
            .unwrap();
        let mut sent = message(5, now());
        sent.mark_sent(None, now()).unwrap();
        let mut rejected = message(5, now());
        rejected
            .record_failure("550 no such user", false, &policy, now())
            .unwrap();

        for m in [&queued, &waiting, &sent, &rejected] {
            store.insert(m).await.unwrap();
        }

        let due = store.fetch_due(10, now(), 3).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, queued.id);

        // After the first backoff elapses the failed one is due again
        let later = store.fetch_due(10, now() + Duration::minutes(5), 3).await.unwrap();
        assert_eq!(later.len(), 2);
    }

    #[tokio::test]
    async fn test_stats() {
        let store = MemoryMessageStore::new();
        let policy = RetryPolicy::default();

        let queued = message(5, now());
        let mut waiting = message(5, now());
        waiting.record_failure("timeout", true, &policy, now()).unwrap();
        let mut rejected = message(5, now());
        rejected.record_failure("bad", false, &policy, now()).unwrap();
        let mut sent = message(5, now());
        sent.mark_sent(Some("id".into()), now()).unwrap();

        for m in [&queued, &waiting, &rejected, &sent] {
            store.insert(m).await.unwrap();
        }

        let stats = store.stats(now(), 3).await.unwrap();
        assert_eq!(
            stats,
            QueueStats {
                total: 4,
                queued: 1,
                sent: 1,
                failed: 2,
                awaiting_retry: 1,
                exhausted: 1,
                due: 1,
            }
        );
    }
}

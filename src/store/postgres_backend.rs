//! PostgreSQL message store.
//!
//! Recipients and attachments are stored as JSONB; everything else maps to a
//! plain column. See `migrations/001_email_queue.sql` for the table.
//!
//! JSONB columns are read as raw values and decoded per row, so one damaged
//! row fails on its own instead of failing the whole query.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::email::{Attachment, EmailMessage, EmailStatus, EmailType};

use super::backend::{MessageStore, QueueStats, StoreError};

const SELECT_COLUMNS: &str = r#"
    id, from_address, from_name, to_addresses, cc_addresses, bcc_addresses,
    subject, html_body, text_body, attachments, priority, email_type,
    template_name, status, retry_count, next_retry_at, last_error,
    provider_message_id, created_at, updated_at, sent_at, failed_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    from_address: String,
    from_name: Option<String>,
    to_addresses: Value,
    cc_addresses: Value,
    bcc_addresses: Value,
    subject: String,
    html_body: Option<String>,
    text_body: Option<String>,
    attachments: Value,
    priority: i16,
    email_type: String,
    template_name: Option<String>,
    status: String,
    retry_count: i32,
    next_retry_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    provider_message_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
}

impl TryFrom<MessageRow> for EmailMessage {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let status = EmailStatus::parse(&row.status).ok_or_else(|| {
            StoreError::InvalidRecord(format!("message {} has status '{}'", row.id, row.status))
        })?;
        let email_type = EmailType::parse(&row.email_type).ok_or_else(|| {
            StoreError::InvalidRecord(format!(
                "message {} has email type '{}'",
                row.id, row.email_type
            ))
        })?;
        let retry_count = u32::try_from(row.retry_count).map_err(|_| {
            StoreError::InvalidRecord(format!(
                "message {} has retry count {}",
                row.id, row.retry_count
            ))
        })?;

        let to: Vec<String> = json_column(row.id, "to_addresses", row.to_addresses)?;
        let cc: Vec<String> = json_column(row.id, "cc_addresses", row.cc_addresses)?;
        let bcc: Vec<String> = json_column(row.id, "bcc_addresses", row.bcc_addresses)?;
        let attachments: Vec<Attachment> = json_column(row.id, "attachments", row.attachments)?;

        Ok(EmailMessage {
            id: row.id,
            from_address: row.from_address,
            from_name: row.from_name,
            to,
            cc,
            bcc,
            subject: row.subject,
            html_body: row.html_body,
            text_body: row.text_body,
            attachments,
            priority: row.priority,
            email_type,
            template_name: row.template_name,
            status,
            retry_count,
            next_retry_at: row.next_retry_at,
            last_error: row.last_error,
            provider_message_id: row.provider_message_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            sent_at: row.sent_at,
            failed_at: row.failed_at,
        })
    }
}

fn json_column<T: DeserializeOwned>(id: Uuid, column: &str, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| {
        StoreError::InvalidRecord(format!("message {} has unreadable {}: {}", id, column, e))
    })
}

/// Split fetched rows into messages and rows that no longer decode.
fn partition_rows(rows: Vec<MessageRow>) -> (Vec<EmailMessage>, Vec<(Uuid, StoreError)>) {
    let mut messages = Vec::with_capacity(rows.len());
    let mut unreadable = Vec::new();

    for row in rows {
        let id = row.id;
        match EmailMessage::try_from(row) {
            Ok(message) => messages.push(message),
            Err(e) => unreadable.push((id, e)),
        }
    }

    (messages, unreadable)
}

fn quarantine_reason(error: &StoreError) -> String {
    format!("Unreadable message row: {}", error)
}

fn retry_count_param(message: &EmailMessage) -> i32 {
    i32::try_from(message.retry_count).unwrap_or(i32::MAX)
}

fn max_retry_param(max_retry_attempts: u32) -> i32 {
    i32::try_from(max_retry_attempts).unwrap_or(i32::MAX)
}

pub struct PostgresMessageStore {
    pool: PgPool,
}

impl PostgresMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Park a row that cannot be decoded as terminally failed.
    ///
    /// With `next_retry_at` cleared it drops out of the due window, so the
    /// next fetch's `LIMIT` is filled by readable rows.
    async fn quarantine(
        &self,
        id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE email_messages
            SET status = 'failed',
                next_retry_at = NULL,
                last_error = $2,
                failed_at = $3,
                updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for PostgresMessageStore {
    async fn fetch_due(
        &self,
        batch_size: usize,
        now: DateTime<Utc>,
        max_retry_attempts: u32,
    ) -> Result<Vec<EmailMessage>, StoreError> {
        let sql = format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM email_messages
            WHERE status = 'queued'
               OR (status = 'failed'
                   AND retry_count < $2
                   AND next_retry_at IS NOT NULL
                   AND next_retry_at <= $1)
            ORDER BY priority ASC, created_at ASC, id ASC
            LIMIT $3
            "#
        );

        let rows: Vec<MessageRow> = sqlx::query_as(&sql)
            .bind(now)
            .bind(max_retry_param(max_retry_attempts))
            .bind(i64::try_from(batch_size).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let (messages, unreadable) = partition_rows(rows);
        for (id, e) in unreadable {
            tracing::warn!(email_id = %id, error = %e, "Quarantining unreadable message row");
            if let Err(e) = self.quarantine(id, &quarantine_reason(&e), now).await {
                tracing::error!(email_id = %id, error = %e, "Failed to quarantine message row");
            }
        }

        Ok(messages)
    }

    async fn insert(&self, message: &EmailMessage) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO email_messages (
                id, from_address, from_name, to_addresses, cc_addresses, bcc_addresses,
                subject, html_body, text_body, attachments, priority, email_type,
                template_name, status, retry_count, next_retry_at, last_error,
                provider_message_id, created_at, updated_at, sent_at, failed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(message.id)
        .bind(&message.from_address)
        .bind(&message.from_name)
        .bind(Json(&message.to))
        .bind(Json(&message.cc))
        .bind(Json(&message.bcc))
        .bind(&message.subject)
        .bind(&message.html_body)
        .bind(&message.text_body)
        .bind(Json(&message.attachments))
        .bind(message.priority)
        .bind(message.email_type.as_str())
        .bind(&message.template_name)
        .bind(message.status.as_str())
        .bind(retry_count_param(message))
        .bind(message.next_retry_at)
        .bind(&message.last_error)
        .bind(&message.provider_message_id)
        .bind(message.created_at)
        .bind(message.updated_at)
        .bind(message.sent_at)
        .bind(message.failed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate(message.id));
        }

        tracing::trace!(email_id = %message.id, "Message stored in PostgreSQL");
        Ok(())
    }

    async fn update(&self, message: &EmailMessage) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM email_messages WHERE id = $1 FOR UPDATE")
                .bind(message.id)
                .fetch_optional(&mut *tx)
                .await?;

        if locked.is_none() {
            return Err(StoreError::NotFound(message.id));
        }

        sqlx::query(
            r#"
            UPDATE email_messages
            SET status = $2,
                retry_count = $3,
                next_retry_at = $4,
                last_error = $5,
                provider_message_id = $6,
                updated_at = $7,
                sent_at = $8,
                failed_at = $9
            WHERE id = $1
            "#,
        )
        .bind(message.id)
        .bind(message.status.as_str())
        .bind(retry_count_param(message))
        .bind(message.next_retry_at)
        .bind(&message.last_error)
        .bind(&message.provider_message_id)
        .bind(message.updated_at)
        .bind(message.sent_at)
        .bind(message.failed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<EmailMessage>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM email_messages WHERE id = $1");
        let row: Option<MessageRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(EmailMessage::try_from).transpose()
    }

    async fn stats(
        &self,
        now: DateTime<Utc>,
        max_retry_attempts: u32,
    ) -> Result<QueueStats, StoreError> {
        let row: (i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status = 'queued'),
                COUNT(*) FILTER (WHERE status = 'sent'),
                COUNT(*) FILTER (WHERE status = 'failed'),
                COUNT(*) FILTER (WHERE status = 'failed'
                                   AND retry_count < $2
                                   AND next_retry_at IS NOT NULL),
                COUNT(*) FILTER (WHERE status = 'queued'
                                    OR (status = 'failed'
                                        AND retry_count < $2
                                        AND next_retry_at IS NOT NULL
                                        AND next_retry_at <= $1))
            FROM email_messages
            "#,
        )
        .bind(now)
        .bind(max_retry_param(max_retry_attempts))
        .fetch_one(&self.pool)
        .await?;

        let (total, queued, sent, failed, awaiting_retry, due) = row;
        let count = |n: i64| u64::try_from(n).unwrap_or(0);

        Ok(QueueStats {
            total: count(total),
            queued: count(queued),
            sent: count(sent),
            failed: count(failed),
            awaiting_retry: count(awaiting_retry),
            exhausted: count(failed - awaiting_retry),
            due: count(due),
        })
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

//! The durable email record and its delivery state machine.
//!
//! ```text
//! Queued ──send ok──▶ Sent (terminal)
//!   │
//!   └──send err──▶ Failed ──due again──▶ send ok / send err
//! ```
//!
//! A `Failed` message with retries left and an elapsed `next_retry_at` is
//! scheduled exactly like a `Queued` one. It becomes terminal once the retry
//! ceiling is reached or the failure was permanent; either way
//! `next_retry_at` is cleared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::backoff::RetryPolicy;
use super::error::{EmailError, EmailResult};
use super::types::{clamp_priority, Attachment, EmailStatus, EmailType, PRIORITY_DEFAULT};
use super::validation::{
    validate_attachments, validate_content, validate_recipients, validate_address,
    ValidationError,
};

/// Everything needed to queue a new email
#[derive(Debug, Clone)]
pub struct EmailDraft {
    pub from_address: String,
    pub from_name: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub attachments: Vec<Attachment>,
    pub priority: i16,
    pub email_type: EmailType,
    pub template_name: Option<String>,
}

impl EmailDraft {
    pub fn new(from_address: impl Into<String>, to: Vec<String>, subject: impl Into<String>) -> Self {
        Self {
            from_address: from_address.into(),
            from_name: None,
            to,
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.into(),
            html_body: None,
            text_body: None,
            attachments: Vec::new(),
            priority: PRIORITY_DEFAULT,
            email_type: EmailType::default(),
            template_name: None,
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html_body = Some(html.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_body = Some(text.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_address(&self.from_address)?;
        validate_recipients(&self.to, &self.cc, &self.bcc)?;
        validate_content(
            &self.subject,
            self.html_body.as_deref(),
            self.text_body.as_deref(),
        )?;
        validate_attachments(&self.attachments)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: Uuid,
    pub from_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub priority: i16,
    pub email_type: EmailType,
    pub template_name: Option<String>,
    pub status: EmailStatus,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub provider_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

/// What `record_failure` decided for the message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Another attempt is scheduled
    RetryScheduled { next_retry_at: DateTime<Utc> },
    /// The retry ceiling has been reached
    Exhausted,
    /// The provider rejected the message outright
    Rejected,
}

impl EmailMessage {
    /// Validate a draft and build a `Queued` message from it.
    pub fn queue(draft: EmailDraft, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        draft.validate()?;

        let non_blank = |body: Option<String>| body.filter(|b| !b.trim().is_empty());

        Ok(Self {
            id: Uuid::new_v4(),
            from_address: draft.from_address.trim().to_string(),
            from_name: draft.from_name.filter(|n| !n.trim().is_empty()),
            to: trim_all(draft.to),
            cc: trim_all(draft.cc),
            bcc: trim_all(draft.bcc),
            subject: draft.subject,
            html_body: non_blank(draft.html_body),
            text_body: non_blank(draft.text_body),
            attachments: draft.attachments,
            priority: clamp_priority(draft.priority),
            email_type: draft.email_type,
            template_name: draft.template_name,
            status: EmailStatus::Queued,
            retry_count: 0,
            next_retry_at: None,
            last_error: None,
            provider_message_id: None,
            created_at: now,
            updated_at: now,
            sent_at: None,
            failed_at: None,
        })
    }

    /// Whether the processor should attempt this message at `now`.
    pub fn is_due(&self, now: DateTime<Utc>, max_retry_attempts: u32) -> bool {
        match self.status {
            EmailStatus::Queued => true,
            EmailStatus::Failed => {
                self.retry_count < max_retry_attempts
                    && self.next_retry_at.is_some_and(|at| at <= now)
            }
            EmailStatus::Sent => false,
        }
    }

    /// Whether the message will never be attempted again.
    pub fn is_terminal(&self, max_retry_attempts: u32) -> bool {
        match self.status {
            EmailStatus::Sent => true,
            EmailStatus::Failed => {
                self.retry_count >= max_retry_attempts || self.next_retry_at.is_none()
            }
            EmailStatus::Queued => false,
        }
    }

    pub fn mark_sent(
        &mut self,
        provider_message_id: Option<String>,
        now: DateTime<Utc>,
    ) -> EmailResult<()> {
        if self.status == EmailStatus::Sent {
            return Err(self.invalid_transition("sent"));
        }

        self.status = EmailStatus::Sent;
        self.provider_message_id = provider_message_id;
        self.last_error = None;
        self.next_retry_at = None;
        self.sent_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Count a failed attempt and schedule the next one if allowed.
    ///
    /// The backoff uses the retry count from before this failure.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        retryable: bool,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> EmailResult<FailureOutcome> {
        if self.status == EmailStatus::Sent {
            return Err(self.invalid_transition("failed"));
        }

        let delay = policy.delay(self.retry_count);

        self.retry_count = self.retry_count.saturating_add(1);
        self.status = EmailStatus::Failed;
        self.last_error = Some(error.into());
        self.failed_at = Some(now);
        self.updated_at = now;

        let outcome = if !retryable {
            self.next_retry_at = None;
            FailureOutcome::Rejected
        } else if policy.is_exhausted(self.retry_count) {
            self.next_retry_at = None;
            FailureOutcome::Exhausted
        } else {
            let next_retry_at = now + delay;
            self.next_retry_at = Some(next_retry_at);
            FailureOutcome::RetryScheduled { next_retry_at }
        };

        Ok(outcome)
    }

    fn invalid_transition(&self, action: &'static str) -> EmailError {
        EmailError::InvalidTransition {
            id: self.id,
            status: self.status,
            action,
        }
    }
}

fn trim_all(addresses: Vec<String>) -> Vec<String> {
    addresses.into_iter().map(|a| a.trim().to_string()).collect()
}

//! Request intake: validates, renders and persists new emails.
//!
//! Nothing here talks to a transport. A request either fails synchronously
//! (and nothing is stored) or produces a `Queued` message for the processor.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{EmailError, EmailResult};
use super::message::{EmailDraft, EmailMessage};
use super::types::{Attachment, EmailType, PRIORITY_DEFAULT};
use crate::clock::Clock;
use crate::config::EmailConfig;
use crate::metrics::DeliveryMetrics;
use crate::store::{MessageStore, QueueStats};
use crate::template::{Params, TemplateRenderer, TemplateSummary};

/// A fully specified email
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendEmailRequest {
    /// Falls back to `email.sender_address`
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub html_body: Option<String>,
    #[serde(default)]
    pub text_body: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub priority: Option<i16>,
    #[serde(default)]
    pub email_type: EmailType,
}

/// An email whose subject and bodies come from a stored template
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplatedEmailRequest {
    pub template_name: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub priority: Option<i16>,
    #[serde(default)]
    pub email_type: EmailType,
}

/// Why one item of a bulk request was not queued
#[derive(Debug, Clone, Serialize)]
pub struct BulkItemError {
    pub index: usize,
    pub to: Vec<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkEnqueueResult {
    pub total: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub ids: Vec<Uuid>,
    pub errors: Vec<BulkItemError>,
}

pub struct EmailService {
    store: Arc<dyn MessageStore>,
    renderer: Arc<TemplateRenderer>,
    clock: Arc<dyn Clock>,
    sender: EmailConfig,
    max_retry_attempts: u32,
}

impl EmailService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        renderer: Arc<TemplateRenderer>,
        clock: Arc<dyn Clock>,
        sender: EmailConfig,
        max_retry_attempts: u32,
    ) -> Self {
        Self {
            store,
            renderer,
            clock,
            sender,
            max_retry_attempts,
        }
    }

    pub async fn send_email(&self, request: SendEmailRequest) -> EmailResult<EmailMessage> {
        let draft = self.direct_draft(request);
        let message = self.enqueue(draft).await?;
        DeliveryMetrics::record_enqueued("direct", 1);
        Ok(message)
    }

    pub async fn send_templated_email(
        &self,
        request: TemplatedEmailRequest,
    ) -> EmailResult<EmailMessage> {
        let rendered = self
            .renderer
            .render(&request.template_name, &request.params)
            .await?;

        let mut draft = EmailDraft::new(
            self.from_address(request.from),
            request.to,
            rendered.subject,
        );
        draft.from_name = self.from_name(request.from_name);
        draft.cc = request.cc;
        draft.bcc = request.bcc;
        draft.html_body = rendered.html_body;
        draft.text_body = rendered.text_body;
        draft.attachments = request.attachments;
        draft.priority = request.priority.unwrap_or(PRIORITY_DEFAULT);
        draft.email_type = request.email_type;
        draft.template_name = Some(request.template_name);

        let message = self.enqueue(draft).await?;
        DeliveryMetrics::record_enqueued("templated", 1);
        Ok(message)
    }

    /// Queue each request independently; one bad item does not stop the rest.
    pub async fn send_bulk(&self, requests: Vec<SendEmailRequest>) -> BulkEnqueueResult {
        let mut result = BulkEnqueueResult {
            total: requests.len(),
            ..BulkEnqueueResult::default()
        };

        for (index, request) in requests.into_iter().enumerate() {
            let to = request.to.clone();
            match self.enqueue(self.direct_draft(request)).await {
                Ok(message) => {
                    result.accepted += 1;
                    result.ids.push(message.id);
                }
                Err(e) => {
                    result.rejected += 1;
                    result.errors.push(BulkItemError {
                        index,
                        to,
                        error: e.to_string(),
                    });
                }
            }
        }

        DeliveryMetrics::record_enqueued("bulk", result.accepted as u64);
        tracing::info!(
            total = result.total,
            accepted = result.accepted,
            rejected = result.rejected,
            "Bulk enqueue completed"
        );

        result
    }

    /// Succeeds when the template exists and is active.
    pub async fn validate_template(&self, name: &str) -> EmailResult<()> {
        if name.trim().is_empty() {
            return Err(EmailError::Validation("Template name is required".to_string()));
        }
        self.renderer.validate_template(name).await?;
        Ok(())
    }

    pub async fn list_templates(&self) -> EmailResult<Vec<TemplateSummary>> {
        Ok(self.renderer.list_templates().await?)
    }

    pub async fn get_message(&self, id: Uuid) -> EmailResult<EmailMessage> {
        self.store.get(id).await?.ok_or(EmailError::NotFound(id))
    }

    pub async fn queue_stats(&self) -> EmailResult<QueueStats> {
        Ok(self
            .store
            .stats(self.clock.now(), self.max_retry_attempts)
            .await?)
    }

    pub fn storage_backend(&self) -> &'static str {
        self.store.backend_name()
    }

    pub fn template_cache_enabled(&self) -> bool {
        self.renderer.cache_enabled()
    }

    fn direct_draft(&self, request: SendEmailRequest) -> EmailDraft {
        let mut draft = EmailDraft::new(self.from_address(request.from), request.to, request.subject);
        draft.from_name = self.from_name(request.from_name);
        draft.cc = request.cc;
        draft.bcc = request.bcc;
        draft.html_body = request.html_body;
        draft.text_body = request.text_body;
        draft.attachments = request.attachments;
        draft.priority = request.priority.unwrap_or(PRIORITY_DEFAULT);
        draft.email_type = request.email_type;
        draft
    }

    fn from_address(&self, requested: Option<String>) -> String {
        requested
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| self.sender.sender_address.clone())
    }

    fn from_name(&self, requested: Option<String>) -> Option<String> {
        requested
            .filter(|n| !n.trim().is_empty())
            .or_else(|| self.sender.sender_name.clone())
    }

    async fn enqueue(&self, draft: EmailDraft) -> EmailResult<EmailMessage> {
        let message = EmailMessage::queue(draft, self.clock.now())?;
        self.store.insert(&message).await?;

        tracing::info!(
            email_id = %message.id,
            recipients = message.to.len() + message.cc.len() + message.bcc.len(),
            priority = message.priority,
            email_type = %message.email_type.as_str(),
            template = message.template_name.as_deref().unwrap_or("-"),
            "Email queued"
        );

        Ok(message)
    }
}

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::email::validation::{
    validate_address, validate_attachments, validate_content, validate_recipients,
    ValidationError,
};
use crate::email::{Attachment, EmailMessage};

/// Classified delivery failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Rejected before any I/O
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Network or provider outage, worth retrying
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Provider refused the message
    #[error("Permanent failure: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    /// Label used in metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Validation(_) => "validation",
            ProviderError::Transient(_) => "transient",
            ProviderError::Permanent(_) => "permanent",
        }
    }
}

impl From<ValidationError> for ProviderError {
    fn from(err: ValidationError) -> Self {
        ProviderError::Validation(err.0)
    }
}

/// A fully rendered message handed to a transport
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub id: Uuid,
    pub from_address: String,
    pub from_name: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl OutboundEmail {
    /// Checks every transport runs before opening a connection.
    pub fn validate(&self) -> Result<(), ProviderError> {
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

    pub fn html(&self) -> Option<&str> {
        self.html_body.as_deref().filter(|b| !b.trim().is_empty())
    }

    pub fn text(&self) -> Option<&str> {
        self.text_body.as_deref().filter(|b| !b.trim().is_empty())
    }

    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }
}

impl From<&EmailMessage> for OutboundEmail {
    fn from(message: &EmailMessage) -> Self {
        Self {
            id: message.id,
            from_address: message.from_address.clone(),
            from_name: message.from_name.clone(),
            to: message.to.clone(),
            cc: message.cc.clone(),
            bcc: message.bcc.clone(),
            subject: message.subject.clone(),
            html_body: message.html_body.clone(),
            text_body: message.text_body.clone(),
            attachments: message.attachments.clone(),
        }
    }
}

/// Successful hand-off to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub provider: &'static str,
    /// Identifier assigned by the transport, if any
    pub message_id: Option<String>,
}

/// A delivery backend.
///
/// Implementations validate the message before any network I/O and classify
/// every failure as validation, transient or permanent.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Backend identifier for logs and metrics
    fn name(&self) -> &'static str;

    async fn send(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, ProviderError>;
}

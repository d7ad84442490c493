//! Development transport that only logs what it would send.

use async_trait::async_trait;

use super::types::{DeliveryReceipt, EmailProvider, OutboundEmail, ProviderError};

#[derive(Debug, Default, Clone, Copy)]
pub struct LogProvider;

impl LogProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailProvider for LogProvider {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, ProviderError> {
        email.validate()?;

        tracing::info!(
            email_id = %email.id,
            from = %email.from_address,
            to = ?email.to,
            recipients = email.recipient_count(),
            subject = %email.subject,
            has_html = email.html().is_some(),
            has_text = email.text().is_some(),
            attachments = email.attachments.len(),
            "Email delivered to log sink"
        );

        Ok(DeliveryReceipt {
            provider: self.name(),
            message_id: Some(format!("log-{}", email.id)),
        })
    }
}

//! SMTP relay transport built on lettre's tokio transport.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, MultiPartBuilder, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::types::{DeliveryReceipt, EmailProvider, OutboundEmail, ProviderError};
use crate::config::SmtpConfig;
use crate::metrics::DeliveryMetrics;

/// How the connection to the relay is secured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    None,
    Starttls,
    Tls,
}

impl TlsMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "none" | "plain" => Some(TlsMode::None),
            "starttls" => Some(TlsMode::Starttls),
            "tls" | "ssl" | "implicit" => Some(TlsMode::Tls),
            _ => None,
        }
    }
}

pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
}

impl SmtpProvider {
    /// Build the transport; no connection is opened until the first send.
    pub fn new(config: &SmtpConfig) -> Result<Self, ProviderError> {
        if config.host.trim().is_empty() {
            return Err(ProviderError::Validation("smtp.host is required".to_string()));
        }

        let tls_mode = TlsMode::parse(&config.tls).ok_or_else(|| {
            ProviderError::Validation(format!("Unknown smtp.tls mode: {}", config.tls))
        })?;

        let host = config.host.clone();
        let tls_parameters = || {
            TlsParameters::new(host.clone())
                .map_err(|e| ProviderError::Validation(format!("TLS configuration error: {}", e)))
        };

        let builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_seconds)));

        let builder = match tls_mode {
            TlsMode::None => builder.tls(Tls::None),
            TlsMode::Starttls => builder.tls(Tls::Required(tls_parameters()?)),
            TlsMode::Tls => builder.tls(Tls::Wrapper(tls_parameters()?)),
        };

        let builder = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
            (None, None) => builder,
            _ => {
                return Err(ProviderError::Validation(
                    "smtp.username and smtp.password must be set together".to_string(),
                ))
            }
        };

        tracing::info!(
            host = %config.host,
            port = config.port,
            tls = ?tls_mode,
            "SMTP transport configured"
        );

        Ok(Self {
            transport: builder.build(),
            host: config.host.clone(),
        })
    }
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, ProviderError> {
        email.validate()?;

        let (message, message_id) = build_message(email)?;
        let start = Instant::now();

        let result = self.transport.send(message).await;
        DeliveryMetrics::observe_send_latency(self.name(), start.elapsed().as_secs_f64());

        match result {
            Ok(response) => {
                tracing::debug!(
                    email_id = %email.id,
                    host = %self.host,
                    code = %response.code(),
                    "SMTP relay accepted message"
                );
                Ok(DeliveryReceipt {
                    provider: self.name(),
                    message_id: Some(message_id),
                })
            }
            Err(e) if e.is_permanent() => Err(ProviderError::Permanent(e.to_string())),
            Err(e) => Err(ProviderError::Transient(e.to_string())),
        }
    }
}

enum Body {
    Single(SinglePart),
    Multi(MultiPart),
}

fn open(builder: MultiPartBuilder, body: Body) -> MultiPart {
    match body {
        Body::Single(part) => builder.singlepart(part),
        Body::Multi(part) => builder.multipart(part),
    }
}

fn parse_address(address: &str) -> Result<Address, ProviderError> {
    address
        .trim()
        .parse()
        .map_err(|_| ProviderError::Validation(format!("Invalid email address: {}", address)))
}

fn parse_content_type(value: &str) -> Result<ContentType, ProviderError> {
    ContentType::parse(value)
        .map_err(|_| ProviderError::Validation(format!("Invalid content type: {}", value)))
}

/// Assemble the MIME message and its Message-ID.
///
/// ```text
/// mixed                      (only with regular attachments)
/// └── related                (only with inline attachments)
///     ├── alternative        (text + html, or a single part)
///     └── inline parts, Content-ID: <cid>
/// └── attachments
/// ```
pub fn build_message(email: &OutboundEmail) -> Result<(Message, String), ProviderError> {
    let from = Mailbox::new(email.from_name.clone(), parse_address(&email.from_address)?);
    let domain = email
        .from_address
        .rsplit_once('@')
        .map(|(_, d)| d.trim().to_string())
        .unwrap_or_else(|| "localhost".to_string());
    let message_id = format!("<{}@{}>", email.id, domain);

    let mut builder = Message::builder()
        .message_id(Some(message_id.clone()))
        .from(from)
        .subject(email.subject.clone());

    for to in &email.to {
        builder = builder.to(Mailbox::new(None, parse_address(to)?));
    }
    for cc in &email.cc {
        builder = builder.cc(Mailbox::new(None, parse_address(cc)?));
    }
    for bcc in &email.bcc {
        builder = builder.bcc(Mailbox::new(None, parse_address(bcc)?));
    }

    let mut body = match (email.html(), email.text()) {
        (Some(html), Some(text)) => {
            Body::Multi(MultiPart::alternative_plain_html(text.to_string(), html.to_string()))
        }
        (Some(html), None) => Body::Single(SinglePart::html(html.to_string())),
        (None, Some(text)) => Body::Single(SinglePart::plain(text.to_string())),
        (None, None) => {
            return Err(ProviderError::Validation(
                "Either an html body or a text body is required".to_string(),
            ))
        }
    };

    let (inline, regular): (Vec<_>, Vec<_>) =
        email.attachments.iter().partition(|a| a.is_inline());

    if !inline.is_empty() {
        let mut related = open(MultiPart::related(), body);
        for attachment in inline {
            let cid = attachment.content_id.clone().unwrap_or_default();
            related = related.singlepart(
                MimeAttachment::new_inline(cid).body(
                    attachment.content.clone(),
                    parse_content_type(&attachment.content_type)?,
                ),
            );
        }
        body = Body::Multi(related);
    }

    if !regular.is_empty() {
        let mut mixed = open(MultiPart::mixed(), body);
        for attachment in regular {
            mixed = mixed.singlepart(
                MimeAttachment::new(attachment.filename.clone()).body(
                    attachment.content.clone(),
                    parse_content_type(&attachment.content_type)?,
                ),
            );
        }
        body = Body::Multi(mixed);
    }

    let message = match body {
        Body::Single(part) => builder.singlepart(part),
        Body::Multi(part) => builder.multipart(part),
    }
    .map_err(|e| ProviderError::Validation(format!("Cannot build message: {}", e)))?;

    Ok((message, message_id))
}

//! Pre-send checks shared by the send-request path and the providers.
//!
//! Nothing in here performs I/O. A failure is reported to the caller
//! synchronously and never enters the retry cycle.

use std::collections::HashSet;
use std::str::FromStr;

use lettre::message::header::ContentType;
use lettre::Address;
use thiserror::Error;

use super::types::Attachment;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Check that `address` is a bare, syntactically valid mailbox address.
pub fn validate_address(address: &str) -> Result<(), ValidationError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("Email address cannot be empty"));
    }
    if trimmed.len() > 254 {
        return Err(ValidationError::new(format!(
            "Email address too long: {}",
            trimmed
        )));
    }
    Address::from_str(trimmed)
        .map(|_| ())
        .map_err(|_| ValidationError::new(format!("Invalid email address: {}", address)))
}

/// Validate one recipient list. Duplicates are compared case-insensitively.
pub fn validate_recipient_list(kind: &str, addresses: &[String]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(addresses.len());
    for address in addresses {
        validate_address(address)?;
        if !seen.insert(address.trim().to_lowercase()) {
            return Err(ValidationError::new(format!(
                "Duplicate {} recipient: {}",
                kind, address
            )));
        }
    }
    Ok(())
}

pub fn validate_recipients(
    to: &[String],
    cc: &[String],
    bcc: &[String],
) -> Result<(), ValidationError> {
    if to.is_empty() {
        return Err(ValidationError::new("At least one recipient is required"));
    }
    validate_recipient_list("to", to)?;
    validate_recipient_list("cc", cc)?;
    validate_recipient_list("bcc", bcc)?;
    Ok(())
}

/// Subject must be non-blank and at least one body must carry content.
pub fn validate_content(
    subject: &str,
    html_body: Option<&str>,
    text_body: Option<&str>,
) -> Result<(), ValidationError> {
    if subject.trim().is_empty() {
        return Err(ValidationError::new("Subject cannot be empty"));
    }

    let has_html = html_body.is_some_and(|b| !b.trim().is_empty());
    let has_text = text_body.is_some_and(|b| !b.trim().is_empty());
    if !has_html && !has_text {
        return Err(ValidationError::new(
            "Either an html body or a text body is required",
        ));
    }

    Ok(())
}

pub fn validate_attachments(attachments: &[Attachment]) -> Result<(), ValidationError> {
    let mut content_ids = HashSet::new();

    for attachment in attachments {
        if attachment.filename.trim().is_empty() {
            return Err(ValidationError::new("Attachment filename cannot be empty"));
        }
        if attachment.content.is_empty() {
            return Err(ValidationError::new(format!(
                "Attachment {} has no content",
                attachment.filename
            )));
        }
        if ContentType::parse(&attachment.content_type).is_err() {
            return Err(ValidationError::new(format!(
                "Attachment {} has invalid content type: {}",
                attachment.filename, attachment.content_type
            )));
        }
        if let Some(cid) = &attachment.content_id {
            if cid.is_empty() || cid.chars().any(|c| c.is_whitespace() || c == '<' || c == '>') {
                return Err(ValidationError::new(format!(
                    "Attachment {} has invalid content id: {}",
                    attachment.filename, cid
                )));
            }
            if !content_ids.insert(cid.as_str()) {
                return Err(ValidationError::new(format!(
                    "Duplicate attachment content id: {}",
                    cid
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to(addrs: &[&str]) -> Vec<String> {
        addrs.iter().map(|s| s.to_string()).collect()
    }

    fn attachment(filename: &str, content_type: &str, cid: Option<&str>) -> Attachment {
        Attachment {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            content: b"data".to_vec(),
            content_id: cid.map(str::to_string),
        }
    }

    #[test]
    fn test_valid_addresses() {
        assert!(validate_address("sam@example.com").is_ok());
        assert!(validate_address("first.last+tag@sub.example.org").is_ok());
        assert!(validate_address("  padded@example.com ").is_ok());
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(validate_address("not-an-email").is_err());
        assert!(validate_address("").is_err());
        assert!(validate_address("a@").is_err());
        assert!(validate_address("@example.com").is_err());
        assert!(validate_address("Sam <sam@example.com>").is_err());
    }

    #[test]
    fn test_recipients_required() {
        let err = validate_recipients(&[], &[], &[]).unwrap_err();
        assert!(err.0.contains("recipient"));
    }

    #[test]
    fn test_duplicate_recipient_rejected() {
        let err = validate_recipients(&to(&["a@example.com", "A@Example.com"]), &[], &[])
            .unwrap_err();
        assert!(err.0.contains("Duplicate"));

        // Same address across different lists is allowed
        assert!(validate_recipients(&to(&["a@example.com"]), &to(&["a@example.com"]), &[]).is_ok());
    }

    #[test]
    fn test_content_rules() {
        assert!(validate_content("Hi", Some("<p>x</p>"), None).is_ok());
        assert!(validate_content("Hi", None, Some("x")).is_ok());
        assert!(validate_content("Hi", Some("<p>x</p>"), Some("x")).is_ok());
        assert!(validate_content("   ", Some("x"), None).is_err());
        assert!(validate_content("Hi", None, None).is_err());
        assert!(validate_content("Hi", Some("  "), Some("")).is_err());
    }

    #[test]
    fn test_attachment_rules() {
        assert!(validate_attachments(&[attachment("a.pdf", "application/pdf", None)]).is_ok());
        assert!(validate_attachments(&[attachment("logo.png", "image/png", Some("logo"))]).is_ok());
        assert!(validate_attachments(&[attachment("", "image/png", None)]).is_err());
        assert!(validate_attachments(&[attachment("a.bin", "not a mime", None)]).is_err());
        assert!(validate_attachments(&[attachment("a.png", "image/png", Some("bad id"))]).is_err());

        let mut empty = attachment("a.txt", "text/plain", None);
        empty.content.clear();
        assert!(validate_attachments(&[empty]).is_err());

        let dup = [
            attachment("a.png", "image/png", Some("logo")),
            attachment("b.png", "image/png", Some("logo")),
        ];
        assert!(validate_attachments(&dup).is_err());
    }
}

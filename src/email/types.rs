use serde::{Deserialize, Serialize};

/// Delivery status of a queued email
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Queued,
    Sent,
    Failed,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Queued => "queued",
            EmailStatus::Sent => "sent",
            EmailStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(EmailStatus::Queued),
            "sent" => Some(EmailStatus::Sent),
            "failed" => Some(EmailStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of an email, used for reporting only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailType {
    #[default]
    Transactional,
    Notification,
    Marketing,
    System,
}

impl EmailType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailType::Transactional => "transactional",
            EmailType::Notification => "notification",
            EmailType::Marketing => "marketing",
            EmailType::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "transactional" => Some(EmailType::Transactional),
            "notification" => Some(EmailType::Notification),
            "marketing" => Some(EmailType::Marketing),
            "system" => Some(EmailType::System),
            _ => None,
        }
    }
}

/// Most urgent priority
pub const PRIORITY_HIGHEST: i16 = 1;
/// Least urgent priority
pub const PRIORITY_LOWEST: i16 = 10;
/// Priority assigned when a request doesn't specify one
pub const PRIORITY_DEFAULT: i16 = 5;

/// Clamp a requested priority into the supported range.
pub fn clamp_priority(priority: i16) -> i16 {
    priority.clamp(PRIORITY_HIGHEST, PRIORITY_LOWEST)
}

/// A file carried with an email.
///
/// When `content_id` is set the attachment is inline and referenced from the
/// html body as `cid:{content_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    /// Raw bytes, base64 encoded on the wire
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
}

impl Attachment {
    pub fn is_inline(&self) -> bool {
        self.content_id.is_some()
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)
    }
}

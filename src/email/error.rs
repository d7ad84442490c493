use thiserror::Error;
use uuid::Uuid;

use super::types::EmailStatus;
use super::validation::ValidationError;
use crate::store::StoreError;
use crate::template::TemplateError;

/// Errors surfaced by the email domain to its callers
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Template is inactive: {0}")]
    TemplateInactive(String),

    #[error("Transient delivery failure: {0}")]
    Transient(String),

    #[error("Permanent delivery failure: {0}")]
    Permanent(String),

    #[error("Email {id} cannot be {action} while {status}")]
    InvalidTransition {
        id: Uuid,
        status: EmailStatus,
        action: &'static str,
    },

    #[error("Email not found: {0}")]
    NotFound(Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

pub type EmailResult<T> = Result<T, EmailError>;

impl From<ValidationError> for EmailError {
    fn from(err: ValidationError) -> Self {
        EmailError::Validation(err.0)
    }
}

impl From<TemplateError> for EmailError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::NotFound(name) => EmailError::TemplateNotFound(name),
            TemplateError::Inactive(name) => EmailError::TemplateInactive(name),
            TemplateError::Storage(msg) => EmailError::Storage(StoreError::Unavailable(msg)),
            other => EmailError::Validation(other.to_string()),
        }
    }
}

//! The email domain: message records, their state machine, retry policy and
//! the intake service that turns requests into queued messages.

mod backoff;
mod error;
mod message;
mod service;
mod types;
pub mod validation;

pub use backoff::RetryPolicy;
pub use error::{EmailError, EmailResult};
pub use message::{EmailDraft, EmailMessage, FailureOutcome};
pub use service::{
    BulkEnqueueResult, BulkItemError, EmailService, SendEmailRequest, TemplatedEmailRequest,
};
pub use types::{
    clamp_priority, Attachment, EmailStatus, EmailType, PRIORITY_DEFAULT, PRIORITY_HIGHEST,
    PRIORITY_LOWEST,
};

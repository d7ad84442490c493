//! Delivery transports.
//!
//! Every backend implements [`EmailProvider`], validates before any I/O and
//! reports failures as validation, transient or permanent so the queue
//! processor can decide whether to retry.

mod factory;
mod html;
mod log;
mod managed_api;
mod smtp;
mod types;

pub use factory::create_provider;
pub use html::strip_html;
pub use log::LogProvider;
pub use managed_api::{classify_status, ManagedApiProvider};
pub use smtp::{build_message, SmtpProvider, TlsMode};
pub use types::{DeliveryReceipt, EmailProvider, OutboundEmail, ProviderError};

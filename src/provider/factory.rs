//! Provider factory

use std::sync::Arc;

use crate::config::Settings;

use super::log::LogProvider;
use super::managed_api::ManagedApiProvider;
use super::smtp::SmtpProvider;
use super::types::{EmailProvider, ProviderError};

/// Create the transport selected by `email.provider`.
///
/// - `"smtp"`: `SmtpProvider` from the `smtp` section
/// - `"api"`: `ManagedApiProvider` from the `managed_api` section
/// - `"log"`: `LogProvider`, only when asked for explicitly
///
/// Incomplete configuration or an unknown name is an error. The log sink
/// reports every message as sent, so it is never substituted for a real
/// transport.
pub fn create_provider(settings: &Settings) -> Result<Arc<dyn EmailProvider>, ProviderError> {
    match settings.email.provider.as_str() {
        "smtp" => {
            let provider = SmtpProvider::new(&settings.smtp)?;
            tracing::info!(provider = "smtp", host = %settings.smtp.host, "Creating SMTP provider");
            Ok(Arc::new(provider))
        }
        "api" => {
            let provider = ManagedApiProvider::new(&settings.managed_api)?;
            tracing::info!(
                provider = "api",
                endpoint = %settings.managed_api.endpoint,
                "Creating managed API provider"
            );
            Ok(Arc::new(provider))
        }
        "log" => {
            tracing::info!(provider = "log", "Creating log provider");
            Ok(Arc::new(LogProvider::new()))
        }
        other => Err(ProviderError::Validation(format!(
            "Unknown email provider: {} (expected smtp, api or log)",
            other
        ))),
    }
}

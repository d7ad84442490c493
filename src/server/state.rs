use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::email::EmailService;
use crate::postgres::PostgresPool;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub email_service: Arc<EmailService>,
    /// Name of the active transport, for the health endpoint
    pub provider_name: &'static str,
    pub postgres_pool: Option<PostgresPool>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        email_service: Arc<EmailService>,
        provider_name: &'static str,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            email_service,
            provider_name,
            postgres_pool: None,
            start_time: Instant::now(),
        }
    }

    pub fn with_postgres(mut self, pool: PostgresPool) -> Self {
        self.postgres_pool = Some(pool);
        self
    }
}

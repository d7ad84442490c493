//! API layer - HTTP endpoint handlers organized by domain.

mod emails;
mod health;
mod metrics;
mod routes;
mod templates;

pub use emails::{get_email, queue_stats, send_bulk, send_email, send_templated_email};
pub use emails::{EmailStatusResponse, EnqueueResponse};
pub use health::{health, HealthResponse};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
pub use templates::{list_templates, validate_template, TemplateListResponse};

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};

use super::emails::{get_email, queue_stats, send_bulk, send_email, send_templated_email};
use super::health::health;
use super::metrics::prometheus_metrics;
use super::templates::{list_templates, validate_template};

pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health & Metrics
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new()
                // Intake
                .route("/emails", post(send_email))
                .route("/emails/templated", post(send_templated_email))
                .route("/emails/bulk", post(send_bulk))
                // Inspection
                .route("/emails/stats", get(queue_stats))
                .route("/emails/{id}", get(get_email))
                // Templates
                .route("/templates", get(list_templates))
                .route("/templates/{name}/validate", get(validate_template))
                .route_layer(middleware::from_fn_with_state(state, api_key_auth)),
        )
}

//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::AppState;
use crate::store::QueueStats;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub storage: StorageHealthResponse,
    pub provider: String,
    pub templates: TemplateHealthResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueStats>,
}

#[derive(Debug, Serialize)]
pub struct StorageHealthResponse {
    pub backend: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_connections: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct TemplateHealthResponse {
    pub cache_enabled: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = state.start_time.elapsed().as_secs();
    let service = &state.email_service;

    let (connected, pool_size, idle_connections) = match &state.postgres_pool {
        Some(pool) => {
            let connected = match pool.ping().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "PostgreSQL health check failed");
                    false
                }
            };
            let inner = pool.pool();
            (connected, Some(inner.size()), Some(inner.num_idle() as u32))
        }
        None => (true, None, None),
    };

    let queue = match service.queue_stats().await {
        Ok(stats) => Some(stats),
        Err(e) => {
            tracing::warn!(error = %e, "Queue stats unavailable for health check");
            None
        }
    };

    let status = if connected && queue.is_some() {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        storage: StorageHealthResponse {
            backend: service.storage_backend().to_string(),
            connected,
            pool_size,
            idle_connections,
        },
        provider: state.provider_name.to_string(),
        templates: TemplateHealthResponse {
            cache_enabled: service.template_cache_enabled(),
        },
        queue,
    })
}

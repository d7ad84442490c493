//! Email intake and inspection endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::email::{
    BulkEnqueueResult, EmailMessage, EmailStatus, EmailType, SendEmailRequest,
    TemplatedEmailRequest,
};
use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::store::QueueStats;

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub id: Uuid,
    pub status: EmailStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&EmailMessage> for EnqueueResponse {
    fn from(message: &EmailMessage) -> Self {
        Self {
            id: message.id,
            status: message.status,
            created_at: message.created_at,
        }
    }
}

/// Delivery state of one message, without bodies or attachment content
#[derive(Debug, Serialize)]
pub struct EmailStatusResponse {
    pub id: Uuid,
    pub status: EmailStatus,
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub priority: i16,
    pub email_type: EmailType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    pub attachment_count: usize,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub provider_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl From<EmailMessage> for EmailStatusResponse {
    fn from(message: EmailMessage) -> Self {
        Self {
            id: message.id,
            status: message.status,
            from: message.from_address,
            to: message.to,
            cc: message.cc,
            subject: message.subject,
            priority: message.priority,
            email_type: message.email_type,
            template_name: message.template_name,
            attachment_count: message.attachments.len(),
            retry_count: message.retry_count,
            next_retry_at: message.next_retry_at,
            last_error: message.last_error,
            provider_message_id: message.provider_message_id,
            created_at: message.created_at,
            updated_at: message.updated_at,
            sent_at: message.sent_at,
            failed_at: message.failed_at,
        }
    }
}

/// POST /api/v1/emails - Queue a fully specified email
#[tracing::instrument(
    name = "http.send_email",
    skip(state, request),
    fields(recipients = request.to.len())
)]
pub async fn send_email(
    State(state): State<AppState>,
    Json(request): Json<SendEmailRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>)> {
    let message = state.email_service.send_email(request).await?;
    Ok((StatusCode::ACCEPTED, Json(EnqueueResponse::from(&message))))
}

/// POST /api/v1/emails/templated - Render a template and queue the result
#[tracing::instrument(
    name = "http.send_templated_email",
    skip(state, request),
    fields(template = %request.template_name)
)]
pub async fn send_templated_email(
    State(state): State<AppState>,
    Json(request): Json<TemplatedEmailRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>)> {
    let message = state.email_service.send_templated_email(request).await?;
    Ok((StatusCode::ACCEPTED, Json(EnqueueResponse::from(&message))))
}

/// POST /api/v1/emails/bulk - Queue many emails, reporting per-item failures
#[tracing::instrument(name = "http.send_bulk", skip(state, requests), fields(count = requests.len()))]
pub async fn send_bulk(
    State(state): State<AppState>,
    Json(requests): Json<Vec<SendEmailRequest>>,
) -> Result<(StatusCode, Json<BulkEnqueueResult>)> {
    if requests.is_empty() {
        return Err(AppError::Validation("At least one email is required".to_string()));
    }

    let result = state.email_service.send_bulk(requests).await;
    Ok((StatusCode::ACCEPTED, Json(result)))
}

/// GET /api/v1/emails/{id} - Current delivery state
pub async fn get_email(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EmailStatusResponse>> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| AppError::Validation(format!("Invalid email id: {}", id)))?;

    let message = state.email_service.get_message(id).await?;
    Ok(Json(message.into()))
}

/// GET /api/v1/emails/stats - Queue counts by state
pub async fn queue_stats(State(state): State<AppState>) -> Result<Json<QueueStats>> {
    Ok(Json(state.email_service.queue_stats().await?))
}

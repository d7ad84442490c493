//! Read-only template endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::error::Result;
use crate::server::AppState;
use crate::template::TemplateSummary;

#[derive(Debug, Serialize)]
pub struct TemplateListResponse {
    pub templates: Vec<TemplateSummary>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct TemplateValidationResponse {
    pub name: String,
    pub valid: bool,
}

/// GET /api/v1/templates - List all templates
#[tracing::instrument(name = "http.list_templates", skip(state))]
pub async fn list_templates(State(state): State<AppState>) -> Result<Json<TemplateListResponse>> {
    let templates = state.email_service.list_templates().await?;
    let total = templates.len();

    Ok(Json(TemplateListResponse { templates, total }))
}

/// GET /api/v1/templates/{name}/validate - Check the template can be rendered
#[tracing::instrument(name = "http.validate_template", skip(state))]
pub async fn validate_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TemplateValidationResponse>> {
    state.email_service.validate_template(&name).await?;
    Ok(Json(TemplateValidationResponse { name, valid: true }))
}

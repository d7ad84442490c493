use std::sync::Arc;

use super::cache::RenderCache;
use super::render::{render_str, Params};
use super::store::TemplateRepository;
use super::types::{EmailTemplate, RenderedEmail, TemplateError, TemplateResult, TemplateSummary};
use crate::metrics::TemplateMetrics;

/// Resolves templates by name and renders them, optionally through a cache.
pub struct TemplateRenderer {
    repository: Arc<dyn TemplateRepository>,
    cache: Option<RenderCache>,
}

impl TemplateRenderer {
    pub fn new(repository: Arc<dyn TemplateRepository>, cache: Option<RenderCache>) -> Self {
        Self { repository, cache }
    }

    /// Render `name` with `params`.
    ///
    /// The template is always looked up so that deactivation and edits are
    /// honoured even when a cached rendering exists.
    pub async fn render(&self, name: &str, params: &Params) -> TemplateResult<RenderedEmail> {
        let template = self.validate_template(name).await?;

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(name, params, template.updated_at) {
                TemplateMetrics::record_cache_hit();
                tracing::trace!(template = %name, "Render cache hit");
                return Ok(hit);
            }
            TemplateMetrics::record_cache_miss();
        }

        let rendered = render_template(&template, params);

        if let Some(cache) = &self.cache {
            cache.insert(name, params, template.updated_at, rendered.clone());
        }

        Ok(rendered)
    }

    /// Fetch a template, failing unless it exists and is active.
    pub async fn validate_template(&self, name: &str) -> TemplateResult<EmailTemplate> {
        let template = self
            .repository
            .find_by_name(name)
            .await?
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;

        if !template.is_active {
            return Err(TemplateError::Inactive(name.to_string()));
        }

        Ok(template)
    }

    pub async fn list_templates(&self) -> TemplateResult<Vec<TemplateSummary>> {
        let templates = self.repository.list().await?;
        Ok(templates.iter().map(EmailTemplate::summary).collect())
    }

    /// Drop cached renderings of `name`.
    pub fn invalidate(&self, name: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate(name);
        }
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub fn backend_name(&self) -> &'static str {
        self.repository.backend_name()
    }
}

/// Render every part of `template`; bodies that come out blank are dropped.
pub fn render_template(template: &EmailTemplate, params: &Params) -> RenderedEmail {
    let render_body = |body: &Option<String>| {
        body.as_deref()
            .map(|b| render_str(b, params))
            .filter(|b| !b.trim().is_empty())
    };

    RenderedEmail {
        subject: render_str(&template.subject_template, params),
        html_body: render_body(&template.html_template),
        text_body: render_body(&template.text_template),
    }
}

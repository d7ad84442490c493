//! Template lookup contract and the in-memory store.

use std::path::Path;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;

use super::types::{EmailTemplate, TemplateError, TemplateResult, UpdateTemplateRequest};

/// Read access to templates used by the renderer.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Look a template up by its unique name.
    async fn find_by_name(&self, name: &str) -> TemplateResult<Option<EmailTemplate>>;

    /// All templates, ordered by name.
    async fn list(&self) -> TemplateResult<Vec<EmailTemplate>>;

    /// Backend identifier for health output
    fn backend_name(&self) -> &'static str;
}

/// In-memory template storage
pub struct MemoryTemplateStore {
    templates: DashMap<String, EmailTemplate>,
}

impl Default for MemoryTemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
        }
    }

    /// Create a new template
    pub fn create(&self, template: EmailTemplate) -> TemplateResult<EmailTemplate> {
        template.validate()?;

        match self.templates.entry(template.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(TemplateError::AlreadyExists(template.name))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(template.clone());
                Ok(template)
            }
        }
    }

    pub fn get(&self, name: &str) -> TemplateResult<EmailTemplate> {
        self.templates
            .get(name)
            .map(|t| t.clone())
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }

    pub fn list_all(&self) -> Vec<EmailTemplate> {
        let mut templates: Vec<_> = self
            .templates
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        templates
    }

    /// Update an existing template; `updated_at` always moves forward.
    pub fn update(&self, name: &str, updates: UpdateTemplateRequest) -> TemplateResult<EmailTemplate> {
        let mut template = self.get(name)?;

        if let Some(subject) = updates.subject_template {
            template.subject_template = subject;
        }

        if let Some(html) = updates.html_template {
            template.html_template = html;
        }

        if let Some(text) = updates.text_template {
            template.text_template = text;
        }

        if let Some(active) = updates.is_active {
            template.is_active = active;
        }

        if let Some(description) = updates.description {
            template.description = description;
        }

        let now = Utc::now();
        template.updated_at = if now > template.updated_at {
            now
        } else {
            template.updated_at + Duration::microseconds(1)
        };
        template.validate()?;

        self.templates.insert(name.to_string(), template.clone());

        Ok(template)
    }

    pub fn delete(&self, name: &str) -> TemplateResult<()> {
        self.templates
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn count(&self) -> usize {
        self.templates.len()
    }

    /// Load a JSON array of templates; existing names are replaced.
    pub async fn load_seed_file(&self, path: impl AsRef<Path>) -> TemplateResult<usize> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            TemplateError::Storage(format!("Cannot read {}: {}", path.display(), e))
        })?;
        self.load_seed_json(&raw)
    }

    pub fn load_seed_json(&self, raw: &str) -> TemplateResult<usize> {
        let templates: Vec<EmailTemplate> = serde_json::from_str(raw)
            .map_err(|e| TemplateError::InvalidTemplate(format!("Seed file is not valid: {}", e)))?;

        for template in &templates {
            template.validate()?;
        }

        let count = templates.len();
        for template in templates {
            self.templates.insert(template.name.clone(), template);
        }

        tracing::info!(count, "Templates seeded");
        Ok(count)
    }
}

#[async_trait]
impl TemplateRepository for MemoryTemplateStore {
    async fn find_by_name(&self, name: &str) -> TemplateResult<Option<EmailTemplate>> {
        Ok(self.templates.get(name).map(|t| t.clone()))
    }

    async fn list(&self) -> TemplateResult<Vec<EmailTemplate>> {
        Ok(self.list_all())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

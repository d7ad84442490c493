use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Template-specific error type
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template is inactive: {0}")]
    Inactive(String),

    #[error("Template already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Template storage error: {0}")]
    Storage(String),
}

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// An email template definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailTemplate {
    /// Unique template name (alphanumeric, dash, underscore, dot)
    pub name: String,

    /// Subject line with {{placeholders}}
    pub subject_template: String,

    /// HTML body template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_template: Option<String>,

    /// Plain text body template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_template: Option<String>,

    /// Inactive templates cannot be rendered
    #[serde(default = "default_active")]
    pub is_active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl EmailTemplate {
    /// Validate the template
    pub fn validate(&self) -> TemplateResult<()> {
        if self.name.is_empty() || self.name.len() > 128 {
            return Err(TemplateError::InvalidTemplate(
                "Name must be 1-128 characters".to_string(),
            ));
        }

        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(TemplateError::InvalidTemplate(
                "Name must contain only alphanumeric, dash, underscore or dot".to_string(),
            ));
        }

        if self.subject_template.trim().is_empty() {
            return Err(TemplateError::InvalidTemplate(
                "Subject template cannot be empty".to_string(),
            ));
        }

        let has_body = |body: &Option<String>| body.as_ref().is_some_and(|b| !b.trim().is_empty());
        if !has_body(&self.html_template) && !has_body(&self.text_template) {
            return Err(TemplateError::InvalidTemplate(
                "Template needs an html or text body".to_string(),
            ));
        }

        Ok(())
    }

    pub fn summary(&self) -> TemplateSummary {
        TemplateSummary {
            name: self.name.clone(),
            description: self.description.clone(),
            is_active: self.is_active,
            has_html: self.html_template.is_some(),
            has_text: self.text_template.is_some(),
            updated_at: self.updated_at,
        }
    }
}

/// Request to update an existing template
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTemplateRequest {
    pub subject_template: Option<String>,

    /// Use null to clear
    pub html_template: Option<Option<String>>,

    /// Use null to clear
    pub text_template: Option<Option<String>>,

    pub is_active: Option<bool>,

    pub description: Option<Option<String>>,
}

/// Listing entry for a template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_active: bool,
    pub has_html: bool,
    pub has_text: bool,
    pub updated_at: DateTime<Utc>,
}

/// Output of rendering a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(name: &str) -> EmailTemplate {
        EmailTemplate {
            name: name.to_string(),
            subject_template: "Hi {{name}}".to_string(),
            html_template: Some("<p>Welcome</p>".to_string()),
            text_template: None,
            is_active: true,
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_template_validation_valid() {
        assert!(template("welcome").validate().is_ok());
        assert!(template("event.reminder_v2").validate().is_ok());
    }

    #[test]
    fn test_template_validation_invalid_name() {
        assert!(template("").validate().is_err());
        assert!(template("bad/name").validate().is_err());
        assert!(template(&"x".repeat(129)).validate().is_err());
    }

    #[test]
    fn test_template_validation_requires_body() {
        let mut t = template("welcome");
        t.html_template = None;
        assert!(matches!(t.validate(), Err(TemplateError::InvalidTemplate(_))));

        t.text_template = Some("Welcome".to_string());
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_seed_json_defaults() {
        let t: EmailTemplate = serde_json::from_value(serde_json::json!({
            "name": "welcome",
            "subject_template": "Hi",
            "text_template": "Welcome"
        }))
        .unwrap();
        assert!(t.is_active);
        assert!(t.html_template.is_none());
    }
}

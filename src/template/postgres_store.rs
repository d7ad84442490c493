//! PostgreSQL template lookup.
//!
//! Templates are managed elsewhere; this side only reads `email_templates`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::store::TemplateRepository;
use super::types::{EmailTemplate, TemplateError, TemplateResult};

type TemplateRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    bool,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

pub struct PostgresTemplateStore {
    pool: PgPool,
}

impl PostgresTemplateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn from_row(row: TemplateRow) -> EmailTemplate {
    let (
        name,
        subject_template,
        html_template,
        text_template,
        is_active,
        description,
        created_at,
        updated_at,
    ) = row;

    EmailTemplate {
        name,
        subject_template,
        html_template,
        text_template,
        is_active,
        description,
        created_at,
        updated_at,
    }
}

fn storage_error(e: sqlx::Error) -> TemplateError {
    TemplateError::Storage(e.to_string())
}

#[async_trait]
impl TemplateRepository for PostgresTemplateStore {
    async fn find_by_name(&self, name: &str) -> TemplateResult<Option<EmailTemplate>> {
        let row: Option<TemplateRow> = sqlx::query_as(
            r#"
            SELECT name, subject_template, html_template, text_template,
                   is_active, description, created_at, updated_at
            FROM email_templates
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.map(from_row))
    }

    async fn list(&self) -> TemplateResult<Vec<EmailTemplate>> {
        let rows: Vec<TemplateRow> = sqlx::query_as(
            r#"
            SELECT name, subject_template, html_template, text_template,
                   is_active, description, created_at, updated_at
            FROM email_templates
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.into_iter().map(from_row).collect())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

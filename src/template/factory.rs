//! Template repository factory

use std::sync::Arc;

use crate::config::{StorageConfig, TemplatesConfig};
use crate::postgres::PostgresPool;

use super::postgres_store::PostgresTemplateStore;
use super::store::{MemoryTemplateStore, TemplateRepository};
use super::types::TemplateResult;

/// Create the template lookup matching `storage.backend`.
///
/// - `"postgres"` with a pool: `PostgresTemplateStore` over `email_templates`
/// - otherwise: `MemoryTemplateStore`, seeded from `templates.seed_file`
pub async fn create_template_repository(
    templates: &TemplatesConfig,
    storage: &StorageConfig,
    postgres_pool: Option<&PostgresPool>,
) -> TemplateResult<Arc<dyn TemplateRepository>> {
    if storage.backend == "postgres" {
        if let Some(pool) = postgres_pool {
            tracing::info!(backend = "postgres", "Creating PostgreSQL template store");
            return Ok(Arc::new(PostgresTemplateStore::new(pool.pool().clone())));
        }
        tracing::warn!(
            "PostgreSQL template store requested but no pool provided, falling back to memory"
        );
    }

    let store = MemoryTemplateStore::new();
    if let Some(path) = &templates.seed_file {
        store.load_seed_file(path).await?;
    }
    tracing::info!(backend = "memory", templates = store.count(), "Creating memory template store");

    Ok(Arc::new(store))
}

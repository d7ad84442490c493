//! Message store factory

use std::sync::Arc;

use crate::config::StorageConfig;
use crate::postgres::PostgresPool;

use super::backend::MessageStore;
use super::memory_backend::MemoryMessageStore;
use super::postgres_backend::PostgresMessageStore;

/// Create a message store based on `storage.backend`.
///
/// - `"postgres"`: `PostgresMessageStore` if a pool is provided
/// - `"memory"` (default): `MemoryMessageStore`
pub fn create_message_store(
    settings: &StorageConfig,
    postgres_pool: Option<&PostgresPool>,
) -> Arc<dyn MessageStore> {
    match settings.backend.as_str() {
        "postgres" => {
            if let Some(pool) = postgres_pool {
                tracing::info!(
                    backend = "postgres",
                    database = %pool.database_url_masked(),
                    "Creating PostgreSQL message store"
                );
                Arc::new(PostgresMessageStore::new(pool.pool().clone()))
            } else {
                tracing::warn!(
                    "PostgreSQL store requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryMessageStore::new())
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory message store");
            Arc::new(MemoryMessageStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_without_pool_falls_back() {
        let settings = StorageConfig {
            backend: "postgres".to_string(),
        };
        assert_eq!(create_message_store(&settings, None).backend_name(), "memory");
        assert_eq!(
            create_message_store(&StorageConfig::default(), None).backend_name(),
            "memory"
        );
    }
}

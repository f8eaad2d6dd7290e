//! Relational existence checks for payload reconciliation.

use async_trait::async_trait;
use ferrofhir_storage::{ResourceIndex, StorageError};
use sqlx_postgres::PgPool;

/// [`ResourceIndex`] backed by the `resources` table.
#[derive(Debug, Clone)]
pub struct PostgresResourceIndex {
    pool: PgPool,
}

impl PostgresResourceIndex {
    /// Creates an index over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceIndex for PostgresResourceIndex {
    async fn version_exists(
        &self,
        resource_type: &str,
        logical_id: &str,
        version: i32,
    ) -> Result<bool, StorageError> {
        // Each check runs in its own transaction so a reconciliation page
        // abort never holds relational locks across blob operations.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::backend(e.to_string()))?;

        let exists: bool = sqlx_core::query_scalar::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM resources \
             WHERE resource_type = $1 AND logical_id = $2 AND version = $3)",
        )
        .bind(resource_type)
        .bind(logical_id)
        .bind(version)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StorageError::backend(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::backend(e.to_string()))?;

        Ok(exists)
    }
}

//! Paginated export search over the `resources` table.

use async_trait::async_trait;
use ferrofhir_core::ExportedResource;
use ferrofhir_storage::{SearchBackend, SearchPage, SearchQuery, StorageError};
use sqlx_core::query_builder::QueryBuilder;
use sqlx_core::row::Row;
use sqlx_postgres::{PgPool, Postgres};
use time::OffsetDateTime;
use tracing::debug;

/// [`SearchBackend`] running each page query in its own transaction with a
/// deterministic (last_modified, logical_id) sort.
#[derive(Debug, Clone)]
pub struct PostgresSearchBackend {
    pool: PgPool,
}

impl PostgresSearchBackend {
    /// Creates a backend over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_predicates<'a>(qb: &mut QueryBuilder<'a, Postgres>, query: &'a SearchQuery) {
        qb.push(" WHERE resource_type = ").push_bind(&query.resource_type);
        if let Some(since) = query.since {
            qb.push(" AND last_modified >= ").push_bind(since);
        }
        if let Some(till) = query.till {
            qb.push(" AND last_modified < ").push_bind(till);
        }
        for (key, value) in &query.filters {
            qb.push(" AND data ->> ")
                .push_bind(key)
                .push(" = ")
                .push_bind(value);
        }
    }
}

#[async_trait]
impl SearchBackend for PostgresSearchBackend {
    async fn search_page(&self, query: &SearchQuery) -> Result<SearchPage, StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::backend(e.to_string()))?;

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM resources");
        Self::push_predicates(&mut count_qb, query);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| StorageError::backend(e.to_string()))?;

        let page_size = query.page_size.max(1);
        let offset = i64::from(query.page.saturating_sub(1)) * i64::from(page_size);

        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT resource_type, logical_id, last_modified, data FROM resources",
        );
        Self::push_predicates(&mut qb, query);
        qb.push(" ORDER BY last_modified, logical_id");
        qb.push(" LIMIT ").push_bind(i64::from(page_size));
        qb.push(" OFFSET ").push_bind(offset);

        let rows = qb
            .build()
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| StorageError::backend(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::backend(e.to_string()))?;

        let mut resources = Vec::with_capacity(rows.len());
        for row in &rows {
            let resource_type: String = row
                .try_get(0)
                .map_err(|e| StorageError::backend(e.to_string()))?;
            let logical_id: String = row
                .try_get(1)
                .map_err(|e| StorageError::backend(e.to_string()))?;
            let last_modified: OffsetDateTime = row
                .try_get(2)
                .map_err(|e| StorageError::backend(e.to_string()))?;
            let body: serde_json::Value = row
                .try_get(3)
                .map_err(|e| StorageError::backend(e.to_string()))?;
            resources.push(ExportedResource::new(
                resource_type,
                logical_id,
                last_modified,
                body,
            ));
        }

        let total = total.max(0) as u64;
        let last_page = total.div_ceil(u64::from(page_size)) as u32;

        debug!(
            resource_type = %query.resource_type,
            page = query.page,
            returned = resources.len(),
            total,
            "Export search page"
        );

        Ok(SearchPage {
            resources,
            last_page,
            total,
        })
    }
}

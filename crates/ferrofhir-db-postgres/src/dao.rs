//! Reference DAO: resolves normalized ids through the tenant cache.
//!
//! The flow for each id family is cache-first: consult the session (staged
//! values, then the shared cache), `SELECT` the misses, insert anything
//! still missing with the dialect's idempotent insert, then `SELECT` again
//! to pick up rows created here or by a concurrent transaction. Ids learned
//! inside the transaction are staged in the session and reach the shared
//! cache only when the caller commits.

use std::collections::HashSet;
use std::sync::Arc;

use ferrofhir_cache::{CacheSession, CommonTokenValue, PersistenceCache};
use sqlx_core::query::query;
use sqlx_core::query_builder::QueryBuilder;
use sqlx_core::row::Row;
use sqlx_postgres::{PgConnection, Postgres};
use tracing::debug;

use crate::dialect::ReferenceDialect;
use crate::error::{PostgresError, Result};
use crate::schema::token_map_table;

/// One token value reference to be normalized and linked to a resource.
#[derive(Debug, Clone)]
pub struct TokenValueRec {
    /// Search parameter name (e.g. "code").
    pub parameter_name: String,
    /// Resolved parameter name id.
    pub parameter_name_id: Option<i32>,
    /// Code system (external system) name.
    pub code_system: String,
    /// Resolved code system id.
    pub code_system_id: Option<i32>,
    /// The token value text.
    pub token_value: String,
    /// Resolved common token value id.
    pub common_token_value_id: Option<i64>,
    /// The logical resource this token belongs to.
    pub logical_resource_id: i64,
}

impl TokenValueRec {
    /// Creates an unresolved record.
    #[must_use]
    pub fn new(
        parameter_name: impl Into<String>,
        code_system: impl Into<String>,
        token_value: impl Into<String>,
        logical_resource_id: i64,
    ) -> Self {
        Self {
            parameter_name: parameter_name.into(),
            parameter_name_id: None,
            code_system: code_system.into(),
            code_system_id: None,
            token_value: token_value.into(),
            common_token_value_id: None,
            logical_resource_id,
        }
    }
}

/// DAO for reference normalization, parameterized by SQL dialect.
pub struct ReferenceDao {
    dialect: Arc<dyn ReferenceDialect>,
}

impl ReferenceDao {
    /// Creates a DAO speaking the given dialect.
    #[must_use]
    pub fn new(dialect: Arc<dyn ReferenceDialect>) -> Self {
        Self { dialect }
    }

    /// Warm-loads the shared caches from the normalization tables.
    ///
    /// Must run before the first insert against this datasource so the
    /// shared cache never misses rows committed before this process
    /// started. Callers normally go through [`Self::maybe_prefill`].
    pub async fn prefill(
        &self,
        conn: &mut PgConnection,
        shared: &PersistenceCache,
    ) -> Result<()> {
        let rows = query("SELECT resource_type, resource_type_id FROM resource_types")
            .fetch_all(&mut *conn)
            .await?;
        for row in &rows {
            let name: String = row.try_get(0)?;
            let id: i32 = row.try_get(1)?;
            shared.resource_types().insert(name, i64::from(id));
        }

        let rows = query("SELECT parameter_name, parameter_name_id FROM parameter_names")
            .fetch_all(&mut *conn)
            .await?;
        for row in &rows {
            let name: String = row.try_get(0)?;
            let id: i32 = row.try_get(1)?;
            shared.parameter_names().insert(name, i64::from(id));
        }

        let rows = query("SELECT code_system_name, code_system_id FROM code_systems")
            .fetch_all(&mut *conn)
            .await?;
        for row in &rows {
            let name: String = row.try_get(0)?;
            let id: i32 = row.try_get(1)?;
            shared.code_systems().insert(name, i64::from(id));
        }

        debug!("Prefilled shared persistence caches");
        Ok(())
    }

    /// Runs the one-time warm load if this cache instance still needs it.
    pub async fn maybe_prefill(
        &self,
        conn: &mut PgConnection,
        session: &CacheSession,
    ) -> Result<()> {
        let shared = session.shared().clone();
        if shared.needs_prefill() {
            self.prefill(conn, &shared).await?;
        }
        Ok(())
    }

    /// Resolves (creating when needed) the code system id for each record.
    pub async fn resolve_code_systems(
        &self,
        conn: &mut PgConnection,
        session: &mut CacheSession,
        recs: &mut [TokenValueRec],
    ) -> Result<()> {
        let mut seen = HashSet::new();
        let misses: Vec<String> = recs
            .iter()
            .filter(|r| session.code_system_id(&r.code_system).is_none())
            .filter(|r| seen.insert(r.code_system.clone()))
            .map(|r| r.code_system.clone())
            .collect();

        if !misses.is_empty() {
            self.stage_code_systems(conn, session, &misses).await?;

            let still: Vec<String> = misses
                .iter()
                .filter(|name| session.code_system_id(name).is_none())
                .cloned()
                .collect();
            if !still.is_empty() {
                for name in &still {
                    query(self.dialect.insert_code_system())
                        .bind(name)
                        .execute(&mut *conn)
                        .await?;
                }
                self.stage_code_systems(conn, session, &still).await?;
            }
        }

        for rec in recs.iter_mut() {
            let id = session
                .code_system_id(&rec.code_system)
                .ok_or_else(|| {
                    PostgresError::missing_row("code_system", rec.code_system.as_str())
                })?;
            rec.code_system_id = Some(id as i32);
        }
        Ok(())
    }

    async fn stage_code_systems(
        &self,
        conn: &mut PgConnection,
        session: &mut CacheSession,
        names: &[String],
    ) -> Result<()> {
        let rows = query(
            "SELECT code_system_name, code_system_id FROM code_systems \
             WHERE code_system_name = ANY($1)",
        )
        .bind(names.to_vec())
        .fetch_all(&mut *conn)
        .await?;
        for row in &rows {
            let name: String = row.try_get(0)?;
            let id: i32 = row.try_get(1)?;
            session.stage_code_system(name, i64::from(id));
        }
        Ok(())
    }

    /// Resolves (creating when needed) the parameter name id for each record.
    pub async fn resolve_parameter_names(
        &self,
        conn: &mut PgConnection,
        session: &mut CacheSession,
        recs: &mut [TokenValueRec],
    ) -> Result<()> {
        let mut seen = HashSet::new();
        let misses: Vec<String> = recs
            .iter()
            .filter(|r| session.parameter_name_id(&r.parameter_name).is_none())
            .filter(|r| seen.insert(r.parameter_name.clone()))
            .map(|r| r.parameter_name.clone())
            .collect();

        if !misses.is_empty() {
            self.stage_parameter_names(conn, session, &misses).await?;

            let still: Vec<String> = misses
                .iter()
                .filter(|name| session.parameter_name_id(name).is_none())
                .cloned()
                .collect();
            if !still.is_empty() {
                for name in &still {
                    query(self.dialect.insert_parameter_name())
                        .bind(name)
                        .execute(&mut *conn)
                        .await?;
                }
                self.stage_parameter_names(conn, session, &still).await?;
            }
        }

        for rec in recs.iter_mut() {
            let id = session
                .parameter_name_id(&rec.parameter_name)
                .ok_or_else(|| {
                    PostgresError::missing_row("parameter_name", rec.parameter_name.as_str())
                })?;
            rec.parameter_name_id = Some(id as i32);
        }
        Ok(())
    }

    async fn stage_parameter_names(
        &self,
        conn: &mut PgConnection,
        session: &mut CacheSession,
        names: &[String],
    ) -> Result<()> {
        let rows = query(
            "SELECT parameter_name, parameter_name_id FROM parameter_names \
             WHERE parameter_name = ANY($1)",
        )
        .bind(names.to_vec())
        .fetch_all(&mut *conn)
        .await?;
        for row in &rows {
            let name: String = row.try_get(0)?;
            let id: i32 = row.try_get(1)?;
            session.stage_parameter_name(name, i64::from(id));
        }
        Ok(())
    }

    /// Resolves (creating when needed) the common token value id for each
    /// record. Parameter name and code system ids must be resolved first.
    pub async fn resolve_common_token_values(
        &self,
        conn: &mut PgConnection,
        session: &mut CacheSession,
        recs: &mut [TokenValueRec],
    ) -> Result<()> {
        let mut keys = Vec::with_capacity(recs.len());
        for rec in recs.iter() {
            keys.push(Self::token_key(rec)?);
        }

        let mut seen = HashSet::new();
        let misses: Vec<CommonTokenValue> = keys
            .iter()
            .filter(|k| session.token_value_id(k).is_none())
            .filter(|k| seen.insert((*k).clone()))
            .cloned()
            .collect();

        if !misses.is_empty() {
            self.stage_token_values(conn, session, &misses).await?;

            let still: Vec<CommonTokenValue> = misses
                .iter()
                .filter(|k| session.token_value_id(k).is_none())
                .cloned()
                .collect();
            if !still.is_empty() {
                for key in &still {
                    query(self.dialect.insert_common_token_value())
                        .bind(key.parameter_name_id)
                        .bind(key.code_system_id)
                        .bind(&key.token_value)
                        .execute(&mut *conn)
                        .await?;
                }
                self.stage_token_values(conn, session, &still).await?;
            }
        }

        for (rec, key) in recs.iter_mut().zip(keys.iter()) {
            let id = session
                .token_value_id(key)
                .ok_or_else(|| PostgresError::missing_row("token_value", key.token_value.as_str()))?;
            rec.common_token_value_id = Some(id);
        }
        Ok(())
    }

    fn token_key(rec: &TokenValueRec) -> Result<CommonTokenValue> {
        match (rec.parameter_name_id, rec.code_system_id) {
            (Some(parameter_name_id), Some(code_system_id)) => Ok(CommonTokenValue::new(
                parameter_name_id,
                code_system_id,
                rec.token_value.clone(),
            )),
            _ => Err(PostgresError::missing_row(
                "token_value prerequisites",
                rec.token_value.as_str(),
            )),
        }
    }

    async fn stage_token_values(
        &self,
        conn: &mut PgConnection,
        session: &mut CacheSession,
        keys: &[CommonTokenValue],
    ) -> Result<()> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT parameter_name_id, code_system_id, token_value, common_token_value_id \
             FROM common_token_values \
             WHERE (parameter_name_id, code_system_id, token_value) IN ",
        );
        qb.push_tuples(keys.iter(), |mut b, key| {
            b.push_bind(key.parameter_name_id);
            b.push_bind(key.code_system_id);
            b.push_bind(key.token_value.clone());
        });

        let rows = qb.build().fetch_all(&mut *conn).await?;
        for row in &rows {
            let parameter_name_id: i32 = row.try_get(0)?;
            let code_system_id: i32 = row.try_get(1)?;
            let token_value: String = row.try_get(2)?;
            let id: i64 = row.try_get(3)?;
            session.stage_token_value(
                CommonTokenValue::new(parameter_name_id, code_system_id, token_value),
                id,
            );
        }
        Ok(())
    }

    /// Normalizes a batch of token values and links them to their logical
    /// resources in the per-type map table.
    ///
    /// Runs entirely inside the caller's transaction; the caller resolves
    /// the matching cache session with `commit()` or `rollback()`.
    pub async fn add_common_token_values(
        &self,
        conn: &mut PgConnection,
        session: &mut CacheSession,
        resource_type: &str,
        recs: &mut [TokenValueRec],
    ) -> Result<()> {
        if recs.is_empty() {
            return Ok(());
        }

        // The warm load must land before any insert below can run.
        self.maybe_prefill(conn, session).await?;

        self.resolve_parameter_names(conn, session, recs).await?;
        self.resolve_code_systems(conn, session, recs).await?;
        self.resolve_common_token_values(conn, session, recs).await?;

        let mut links = Vec::with_capacity(recs.len());
        for rec in recs.iter() {
            let token_id = rec.common_token_value_id.ok_or_else(|| {
                PostgresError::missing_row("token_value", rec.token_value.as_str())
            })?;
            links.push((rec.logical_resource_id, token_id));
        }

        let table = token_map_table(resource_type)?;
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {table} (logical_resource_id, common_token_value_id) "
        ));
        qb.push_values(links.iter(), |mut b, (logical_resource_id, token_id)| {
            b.push_bind(*logical_resource_id);
            b.push_bind(*token_id);
        });
        qb.build().execute(&mut *conn).await?;

        debug!(
            resource_type,
            count = recs.len(),
            dialect = self.dialect.name(),
            "Linked common token values"
        );
        Ok(())
    }

    /// Resolves (creating when needed) the logical resource id for one
    /// (resource type id, logical id) identity.
    pub async fn resolve_logical_resource_ident(
        &self,
        conn: &mut PgConnection,
        session: &mut CacheSession,
        resource_type_id: i32,
        logical_id: &str,
    ) -> Result<i64> {
        use ferrofhir_cache::LogicalResourceIdent;

        let key = LogicalResourceIdent::new(resource_type_id, logical_id);
        if let Some(id) = session.logical_resource_id(&key) {
            return Ok(id);
        }

        let select = "SELECT logical_resource_id FROM logical_resource_ident \
                      WHERE resource_type_id = $1 AND logical_id = $2";

        let found: Option<i64> = sqlx_core::query_scalar::query_scalar(select)
            .bind(resource_type_id)
            .bind(logical_id)
            .fetch_optional(&mut *conn)
            .await?;

        let id = match found {
            Some(id) => id,
            None => {
                query(self.dialect.insert_logical_resource_ident())
                    .bind(resource_type_id)
                    .bind(logical_id)
                    .execute(&mut *conn)
                    .await?;
                sqlx_core::query_scalar::query_scalar(select)
                    .bind(resource_type_id)
                    .bind(logical_id)
                    .fetch_optional(&mut *conn)
                    .await?
                    .ok_or_else(|| {
                        PostgresError::missing_row("logical_resource_ident", logical_id)
                    })?
            }
        };

        session.stage_logical_resource(key, id);
        Ok(id)
    }
}

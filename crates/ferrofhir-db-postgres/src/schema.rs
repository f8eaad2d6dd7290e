//! Minimal schema management for the tables this backend touches.

use sqlx_postgres::PgPool;
use tracing::debug;

use crate::error::{PostgresError, Result};

/// Validates a dynamic SQL identifier (table names built from resource
/// type names). Anything but ASCII alphanumerics and underscores is
/// rejected before it can reach a statement.
pub fn assert_valid_identifier(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() <= 63
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        && !name.as_bytes()[0].is_ascii_digit();
    if ok {
        Ok(())
    } else {
        Err(PostgresError::invalid_identifier(name))
    }
}

/// The token-values map table for one resource type.
pub fn token_map_table(resource_type: &str) -> Result<String> {
    let table = format!("{}_token_values_map", resource_type.to_lowercase());
    assert_valid_identifier(&table)?;
    Ok(table)
}

const DDL: &[&str] = &[
    "CREATE SEQUENCE IF NOT EXISTS fhir_sequence CACHE 1000",
    r#"
    CREATE TABLE IF NOT EXISTS resource_types (
        resource_type_id   INT PRIMARY KEY,
        resource_type      TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS parameter_names (
        parameter_name_id  INT PRIMARY KEY,
        parameter_name     TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS code_systems (
        code_system_id     INT PRIMARY KEY,
        code_system_name   TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS common_token_values (
        common_token_value_id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
        parameter_name_id  INT NOT NULL,
        code_system_id     INT NOT NULL,
        token_value        TEXT NOT NULL,
        UNIQUE (parameter_name_id, code_system_id, token_value)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS logical_resource_ident (
        resource_type_id   INT NOT NULL,
        logical_id         TEXT NOT NULL,
        logical_resource_id BIGINT NOT NULL,
        PRIMARY KEY (resource_type_id, logical_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS resources (
        resource_type      TEXT NOT NULL,
        logical_id         TEXT NOT NULL,
        version            INT NOT NULL,
        last_modified      TIMESTAMPTZ NOT NULL,
        data               JSONB NOT NULL,
        PRIMARY KEY (resource_type, logical_id, version)
    )
    "#,
];

/// Creates the sequence and tables this backend reads and writes.
///
/// Idempotent; also creates one token-values map table per resource type
/// in `resource_types`.
pub async fn ensure_schema(pool: &PgPool, resource_types: &[&str]) -> Result<()> {
    for ddl in DDL.iter().copied() {
        sqlx_core::query::query(ddl).execute(pool).await?;
    }

    for resource_type in resource_types {
        let table = token_map_table(resource_type)?;
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                logical_resource_id   BIGINT NOT NULL,
                common_token_value_id BIGINT NOT NULL
            )
            "#
        );
        sqlx_core::query::query(&ddl).execute(pool).await?;
    }

    debug!(types = resource_types.len(), "Schema ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(assert_valid_identifier("patient_token_values_map").is_ok());
        assert!(assert_valid_identifier("x9_y").is_ok());
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(assert_valid_identifier("").is_err());
        assert!(assert_valid_identifier("9start").is_err());
        assert!(assert_valid_identifier("drop table;").is_err());
        assert!(assert_valid_identifier("name-with-dash").is_err());
    }

    #[test]
    fn test_token_map_table() {
        assert_eq!(
            token_map_table("Patient").unwrap(),
            "patient_token_values_map"
        );
        assert!(token_map_table("Pa;tient").is_err());
    }
}

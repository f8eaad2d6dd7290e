//! Flavor-dispatched SQL dialects for reference normalization.
//!
//! Each supported database flavor gets one concrete dialect implementing
//! the idempotent-insert statements the reference DAO needs. The flavor
//! set is closed at configuration parse time ([`ferrofhir_config::DbFlavor`]
//! rejects unknown names as a fatal configuration error), so dispatch here
//! is total.

use std::sync::Arc;

use ferrofhir_config::DbFlavor;

/// SQL statements that differ between database flavors.
///
/// Every statement is an *idempotent* insert: running it when the row
/// already exists inserts nothing and raises nothing, so concurrent
/// transactions racing on the same name converge on one row.
pub trait ReferenceDialect: Send + Sync {
    /// Idempotent insert of a code system name. Binds: `$1` name.
    fn insert_code_system(&self) -> &'static str;

    /// Idempotent insert of a search parameter name. Binds: `$1` name.
    fn insert_parameter_name(&self) -> &'static str;

    /// Idempotent insert of a common token value. Binds: `$1`
    /// parameter_name_id, `$2` code_system_id, `$3` token_value.
    fn insert_common_token_value(&self) -> &'static str;

    /// Idempotent insert of a logical resource identity. Binds: `$1`
    /// resource_type_id, `$2` logical_id.
    fn insert_logical_resource_ident(&self) -> &'static str;

    /// The flavor name for logging.
    fn name(&self) -> &'static str;
}

/// Plain PostgreSQL: `ON CONFLICT DO NOTHING` everywhere.
#[derive(Debug, Default)]
pub struct PostgresDialect;

impl ReferenceDialect for PostgresDialect {
    fn insert_code_system(&self) -> &'static str {
        r#"
        INSERT INTO code_systems (code_system_id, code_system_name)
        VALUES (nextval('fhir_sequence'), $1)
        ON CONFLICT (code_system_name) DO NOTHING
        "#
    }

    fn insert_parameter_name(&self) -> &'static str {
        r#"
        INSERT INTO parameter_names (parameter_name_id, parameter_name)
        VALUES (nextval('fhir_sequence'), $1)
        ON CONFLICT (parameter_name) DO NOTHING
        "#
    }

    fn insert_common_token_value(&self) -> &'static str {
        r#"
        INSERT INTO common_token_values (parameter_name_id, code_system_id, token_value)
        VALUES ($1, $2, $3)
        ON CONFLICT (parameter_name_id, code_system_id, token_value) DO NOTHING
        "#
    }

    fn insert_logical_resource_ident(&self) -> &'static str {
        r#"
        INSERT INTO logical_resource_ident (resource_type_id, logical_id, logical_resource_id)
        VALUES ($1, $2, nextval('fhir_sequence'))
        ON CONFLICT (resource_type_id, logical_id) DO NOTHING
        "#
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

/// Citus: distributed tables reject `ON CONFLICT` when the arbiter index
/// does not include the distribution column, so the normalization tables
/// use a negative outer join instead - insert only the values the table
/// does not already hold.
#[derive(Debug, Default)]
pub struct CitusDialect;

impl ReferenceDialect for CitusDialect {
    fn insert_code_system(&self) -> &'static str {
        r#"
        INSERT INTO code_systems (code_system_id, code_system_name)
             SELECT nextval('fhir_sequence'), v.name
               FROM (VALUES ($1::TEXT)) AS v(name)
    LEFT OUTER JOIN code_systems s
                 ON s.code_system_name = v.name
              WHERE s.code_system_name IS NULL
        "#
    }

    fn insert_parameter_name(&self) -> &'static str {
        r#"
        INSERT INTO parameter_names (parameter_name_id, parameter_name)
             SELECT nextval('fhir_sequence'), v.name
               FROM (VALUES ($1::TEXT)) AS v(name)
    LEFT OUTER JOIN parameter_names p
                 ON p.parameter_name = v.name
              WHERE p.parameter_name IS NULL
        "#
    }

    fn insert_common_token_value(&self) -> &'static str {
        r#"
        INSERT INTO common_token_values (parameter_name_id, code_system_id, token_value)
             SELECT v.parameter_name_id, v.code_system_id, v.token_value
               FROM (VALUES ($1::INT, $2::INT, $3::TEXT))
                 AS v(parameter_name_id, code_system_id, token_value)
    LEFT OUTER JOIN common_token_values ctv
                 ON ctv.parameter_name_id = v.parameter_name_id
                AND ctv.code_system_id = v.code_system_id
                AND ctv.token_value = v.token_value
              WHERE ctv.token_value IS NULL
        "#
    }

    fn insert_logical_resource_ident(&self) -> &'static str {
        r#"
        INSERT INTO logical_resource_ident (resource_type_id, logical_id, logical_resource_id)
             SELECT v.resource_type_id, v.logical_id, nextval('fhir_sequence')
               FROM (VALUES ($1::INT, $2::TEXT)) AS v(resource_type_id, logical_id)
    LEFT OUTER JOIN logical_resource_ident lri
                 ON lri.resource_type_id = v.resource_type_id
                AND lri.logical_id = v.logical_id
              WHERE lri.logical_id IS NULL
        "#
    }

    fn name(&self) -> &'static str {
        "citus"
    }
}

/// Returns the dialect for a resolved database flavor.
#[must_use]
pub fn dialect_for(flavor: DbFlavor) -> Arc<dyn ReferenceDialect> {
    match flavor {
        DbFlavor::Postgres => Arc::new(PostgresDialect),
        DbFlavor::Citus => Arc::new(CitusDialect),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_by_flavor() {
        assert_eq!(dialect_for(DbFlavor::Postgres).name(), "postgres");
        assert_eq!(dialect_for(DbFlavor::Citus).name(), "citus");
    }

    #[test]
    fn test_postgres_uses_on_conflict() {
        let dialect = PostgresDialect;
        assert!(dialect.insert_code_system().contains("ON CONFLICT"));
        assert!(dialect.insert_common_token_value().contains("DO NOTHING"));
    }

    #[test]
    fn test_citus_uses_negative_outer_join() {
        let dialect = CitusDialect;
        assert!(dialect.insert_code_system().contains("LEFT OUTER JOIN"));
        assert!(!dialect.insert_code_system().contains("ON CONFLICT"));
        assert!(dialect.insert_common_token_value().contains("IS NULL"));
    }
}

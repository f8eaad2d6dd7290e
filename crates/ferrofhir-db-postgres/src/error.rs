//! Error types for the PostgreSQL persistence backend.

use ferrofhir_storage::StorageError;

/// Result alias using [`PostgresError`].
pub type Result<T> = std::result::Result<T, PostgresError>;

/// Errors specific to the PostgreSQL persistence backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database driver error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::error::Error),

    /// A row that was just inserted could not be read back.
    ///
    /// This means another session deleted it mid-transaction; the enclosing
    /// transaction must fail.
    #[error("Row for {entity} '{value}' inserted but not found")]
    MissingRow { entity: &'static str, value: String },

    /// A dynamic SQL identifier failed validation.
    #[error("Invalid SQL identifier: {name}")]
    InvalidIdentifier { name: String },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    /// Creates a new missing-row error.
    #[must_use]
    pub fn missing_row(entity: &'static str, value: impl Into<String>) -> Self {
        Self::MissingRow {
            entity,
            value: value.into(),
        }
    }

    /// Creates a new invalid-identifier error.
    #[must_use]
    pub fn invalid_identifier(name: impl Into<String>) -> Self {
        Self::InvalidIdentifier { name: name.into() }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Database(e) => StorageError::backend(e.to_string()),
            PostgresError::MissingRow { entity, value } => {
                StorageError::internal(format!("row for {entity} '{value}' vanished"))
            }
            PostgresError::InvalidIdentifier { name } => {
                StorageError::internal(format!("invalid SQL identifier: {name}"))
            }
            PostgresError::Config { message } => {
                StorageError::internal(format!("configuration error: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PostgresError::missing_row("code_system", "http://loinc.org");
        assert_eq!(
            err.to_string(),
            "Row for code_system 'http://loinc.org' inserted but not found"
        );

        let err = PostgresError::invalid_identifier("bad;name");
        assert_eq!(err.to_string(), "Invalid SQL identifier: bad;name");
    }

    #[test]
    fn test_conversion_to_storage_error() {
        let err: StorageError = PostgresError::config("missing url").into();
        assert!(err.to_string().contains("missing url"));
    }
}

//! Error types for the export pipeline.

use ferrofhir_config::ConfigError;
use ferrofhir_core::CoreError;
use ferrofhir_storage::StorageError;

/// Errors that can occur while running an export job.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// A malformed or missing job parameter. Fatal for the job.
    #[error("Invalid job parameter: {message}")]
    Parameters { message: String },

    /// A fatal configuration error (missing tenant property group,
    /// unknown provider). Never retried.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A search or object-store failure. Propagates to the job driver,
    /// which fails the partition.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A resource body failed to serialize.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A Parquet part failed to encode.
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// A partition task aborted unexpectedly.
    #[error("Partition failed: {message}")]
    Partition { message: String },
}

impl ExportError {
    /// Creates a new invalid-parameter error.
    #[must_use]
    pub fn parameters(message: impl Into<String>) -> Self {
        Self::Parameters {
            message: message.into(),
        }
    }

    /// Creates a new partition-failure error.
    #[must_use]
    pub fn partition(message: impl Into<String>) -> Self {
        Self::Partition {
            message: message.into(),
        }
    }

    /// Returns `true` for configuration/parameter errors that must never
    /// be retried.
    #[must_use]
    pub fn is_fatal_config(&self) -> bool {
        matches!(self, Self::Parameters { .. } | Self::Config(_))
    }
}

impl From<CoreError> for ExportError {
    fn from(err: CoreError) -> Self {
        Self::parameters(err.to_string())
    }
}

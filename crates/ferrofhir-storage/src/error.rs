//! Storage error types.

/// Errors that can occur during storage operations.
///
/// An absent object on a read path is NOT an error: reads return
/// `Ok(None)` so callers can treat deletion and absence as soft results.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A storage key could not be parsed into a blob name.
    #[error("Invalid blob name '{key}': {message}")]
    InvalidBlobName {
        /// The offending key.
        key: String,
        /// Why it does not parse.
        message: String,
    },

    /// An unknown multipart upload id was referenced.
    #[error("Unknown upload: {upload_id}")]
    UnknownUpload {
        /// The upload id that was not found.
        upload_id: String,
    },

    /// An I/O failure in a file-backed store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A backend-specific failure (database driver, object client).
    #[error("Backend error: {message}")]
    Backend {
        /// Description of the backend failure.
        message: String,
    },

    /// An internal invariant was violated.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `InvalidBlobName` error.
    #[must_use]
    pub fn invalid_blob_name(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidBlobName {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a new `UnknownUpload` error.
    #[must_use]
    pub fn unknown_upload(upload_id: impl Into<String>) -> Self {
        Self::UnknownUpload {
            upload_id: upload_id.into(),
        }
    }

    /// Creates a new `Backend` error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is an invalid blob name error.
    #[must_use]
    pub fn is_invalid_blob_name(&self) -> bool {
        matches!(self, Self::InvalidBlobName { .. })
    }
}

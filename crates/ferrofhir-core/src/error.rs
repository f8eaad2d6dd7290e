use thiserror::Error;

/// Result alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error types shared across the FerroFHIR crates.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid FHIR instant: {0}")]
    InvalidInstant(String),

    #[error("Invalid resource data: {message}")]
    InvalidResource { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new InvalidInstant error.
    pub fn invalid_instant(instant: impl Into<String>) -> Self {
        Self::InvalidInstant(instant.into())
    }

    /// Create a new InvalidResource error.
    pub fn invalid_resource(message: impl Into<String>) -> Self {
        Self::InvalidResource {
            message: message.into(),
        }
    }

    /// Returns `true` if this error was caused by an unparseable instant.
    #[must_use]
    pub fn is_invalid_instant(&self) -> bool {
        matches!(self, Self::InvalidInstant(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::invalid_instant("not-a-date");
        assert_eq!(err.to_string(), "Invalid FHIR instant: not-a-date");
        assert!(err.is_invalid_instant());

        let err = CoreError::invalid_resource("missing resourceType");
        assert_eq!(err.to_string(), "Invalid resource data: missing resourceType");
        assert!(!err.is_invalid_instant());
    }
}

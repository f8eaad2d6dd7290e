//! RFC3339 instant parsing and formatting.

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{CoreError, Result};

/// Parses a FHIR instant (RFC3339) into an `OffsetDateTime`.
///
/// # Errors
///
/// Returns `CoreError::InvalidInstant` when the value does not parse.
pub fn parse_instant(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|e| CoreError::invalid_instant(format!("'{value}': {e}")))
}

/// Formats an `OffsetDateTime` as a FHIR instant (RFC3339).
#[must_use]
pub fn format_instant(value: OffsetDateTime) -> String {
    // Rfc3339 formatting only fails for years outside 0..=9999, which
    // cannot be produced by values we parse or store.
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| value.unix_timestamp().to_string())
}

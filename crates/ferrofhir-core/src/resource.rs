//! The resource shape that flows through the export pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::{CoreError, Result};
use crate::time::parse_instant;

/// One resource version as returned by a paginated export search.
///
/// The body is the full FHIR resource JSON; the envelope fields are lifted
/// out so the pipeline can deduplicate and sort without re-parsing the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedResource {
    /// The FHIR resource type (e.g. "Patient", "Observation").
    pub resource_type: String,
    /// The logical id of the resource.
    pub logical_id: String,
    /// When this version was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
    /// The full resource content as JSON.
    pub body: Value,
}

impl ExportedResource {
    /// Creates a new `ExportedResource`.
    #[must_use]
    pub fn new(
        resource_type: impl Into<String>,
        logical_id: impl Into<String>,
        last_modified: OffsetDateTime,
        body: Value,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            logical_id: logical_id.into(),
            last_modified,
            body,
        }
    }

    /// Lifts the envelope fields out of a raw resource body.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidResource` when `resourceType` or `id` are
    /// missing, and `CoreError::InvalidInstant` when `meta.lastUpdated` is
    /// present but unparseable. A missing `meta.lastUpdated` falls back to
    /// the provided default.
    pub fn from_body(body: Value, default_last_modified: OffsetDateTime) -> Result<Self> {
        let resource_type = body
            .get("resourceType")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::invalid_resource("missing resourceType"))?
            .to_string();
        let logical_id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::invalid_resource("missing id"))?
            .to_string();

        let last_modified = match body
            .get("meta")
            .and_then(|m| m.get("lastUpdated"))
            .and_then(Value::as_str)
        {
            Some(instant) => parse_instant(instant)?,
            None => default_last_modified,
        };

        Ok(Self {
            resource_type,
            logical_id,
            last_modified,
            body,
        })
    }

    /// The `Type/id` identity used for in-memory deduplication.
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{}/{}", self.resource_type, self.logical_id)
    }
}

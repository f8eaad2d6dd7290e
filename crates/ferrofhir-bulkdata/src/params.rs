//! Export job parameters.

use std::collections::HashMap;
use std::str::FromStr;

use ferrofhir_core::parse_instant;
use time::OffsetDateTime;

use crate::error::ExportError;

/// NDJSON media type for `_outputFormat`.
pub const NDJSON_CONTENT_TYPE: &str = "application/fhir+ndjson";

/// Parquet media type for `_outputFormat`.
pub const PARQUET_CONTENT_TYPE: &str = "application/fhir+parquet";

/// The export output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Ndjson,
    Parquet,
}

impl ExportFormat {
    /// File extension for output objects.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Ndjson => "ndjson",
            ExportFormat::Parquet => "parquet",
        }
    }

    /// The media type as sent in `_outputFormat`.
    #[must_use]
    pub fn media_type(&self) -> &'static str {
        match self {
            ExportFormat::Ndjson => NDJSON_CONTENT_TYPE,
            ExportFormat::Parquet => PARQUET_CONTENT_TYPE,
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            NDJSON_CONTENT_TYPE | "ndjson" => Ok(ExportFormat::Ndjson),
            PARQUET_CONTENT_TYPE | "parquet" => Ok(ExportFormat::Parquet),
            other => Err(ExportError::parameters(format!(
                "unsupported _outputFormat: {other}"
            ))),
        }
    }
}

/// One `_typeFilter` clause: a resource type plus search parameter
/// constraints narrowing which resources of that type are exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeFilter {
    /// The resource type this clause applies to.
    pub resource_type: String,
    /// Search parameter key/value pairs.
    pub params: Vec<(String, String)>,
}

impl TypeFilter {
    /// Parses a clause like `Patient?gender=female&active=true`.
    ///
    /// A clause without `?` constrains nothing beyond the type.
    ///
    /// # Errors
    ///
    /// Returns `ExportError::Parameters` for an empty type or a parameter
    /// without `=`.
    pub fn parse(clause: &str) -> Result<Self, ExportError> {
        let (resource_type, query) = match clause.split_once('?') {
            Some((t, q)) => (t, Some(q)),
            None => (clause, None),
        };
        if resource_type.is_empty() {
            return Err(ExportError::parameters(format!(
                "empty resource type in _typeFilter clause '{clause}'"
            )));
        }

        let mut params = Vec::new();
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    ExportError::parameters(format!(
                        "malformed parameter '{pair}' in _typeFilter clause '{clause}'"
                    ))
                })?;
                params.push((key.to_string(), value.to_string()));
            }
        }

        Ok(Self {
            resource_type: resource_type.to_string(),
            params,
        })
    }
}

/// Parameters consumed from the enclosing job context.
#[derive(Debug, Clone)]
pub struct JobParameters {
    /// Tenant id for configuration and cache selection.
    pub tenant_id: String,
    /// Datastore id for configuration and cache selection.
    pub datastore_id: String,
    /// The originating request URL, echoed in logs and the manifest.
    pub request_url: String,
    /// Distinct resource types to export, in request order.
    pub resource_types: Vec<String>,
    /// Inclusive lower bound on last-modified (`_since`).
    pub since: Option<OffsetDateTime>,
    /// Exclusive upper bound on last-modified (`_till`).
    pub till: Option<OffsetDateTime>,
    /// Ordered `_typeFilter` clauses.
    pub type_filters: Vec<TypeFilter>,
    /// Output format.
    pub format: ExportFormat,
    /// Storage provider source id.
    pub source: String,
    /// Key prefix inside the destination container.
    pub path_prefix: String,
}

impl JobParameters {
    /// Builds parameters from the key/value pairs handed over by the job
    /// framework.
    ///
    /// Recognized keys: `fhir.tenant`, `fhir.datastore`, `fhir.requestUrl`,
    /// `fhir.resourceTypes` (comma-separated), `fhir.search.since`,
    /// `fhir.search.till`, `fhir.typeFilter` (comma-separated clauses),
    /// `fhir.exportFormat`, `fhir.source`, `fhir.pathPrefix`.
    ///
    /// # Errors
    ///
    /// Returns `ExportError::Parameters` for missing required keys or
    /// malformed values. Fatal for the job.
    pub fn from_pairs(pairs: &HashMap<String, String>) -> Result<Self, ExportError> {
        let required = |key: &str| {
            pairs
                .get(key)
                .map(String::as_str)
                .ok_or_else(|| ExportError::parameters(format!("missing job parameter '{key}'")))
        };

        let resource_types: Vec<String> = required("fhir.resourceTypes")?
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        let parse_bound = |key: &str| -> Result<Option<OffsetDateTime>, ExportError> {
            pairs
                .get(key)
                .map(|v| parse_instant(v))
                .transpose()
                .map_err(|e| ExportError::parameters(format!("{key}: {e}")))
        };

        let type_filters = pairs
            .get("fhir.typeFilter")
            .map(String::as_str)
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(TypeFilter::parse)
            .collect::<Result<Vec<_>, _>>()?;

        let format = pairs
            .get("fhir.exportFormat")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            tenant_id: required("fhir.tenant")?.to_string(),
            datastore_id: required("fhir.datastore")?.to_string(),
            request_url: pairs
                .get("fhir.requestUrl")
                .cloned()
                .unwrap_or_default(),
            resource_types,
            since: parse_bound("fhir.search.since")?,
            till: parse_bound("fhir.search.till")?,
            type_filters,
            format,
            source: required("fhir.source")?.to_string(),
            path_prefix: pairs
                .get("fhir.pathPrefix")
                .cloned()
                .unwrap_or_default(),
        })
    }

    /// The ordered filter clauses applying to one resource type.
    ///
    /// A type with no configured clause gets a single unconstrained pass.
    #[must_use]
    pub fn filters_for(&self, resource_type: &str) -> Vec<Vec<(String, String)>> {
        let filters: Vec<Vec<(String, String)>> = self
            .type_filters
            .iter()
            .filter(|f| f.resource_type == resource_type)
            .map(|f| f.params.clone())
            .collect();
        if filters.is_empty() {
            vec![Vec::new()]
        } else {
            filters
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(
            "application/fhir+ndjson".parse::<ExportFormat>().unwrap(),
            ExportFormat::Ndjson
        );
        assert_eq!(
            "application/fhir+parquet".parse::<ExportFormat>().unwrap(),
            ExportFormat::Parquet
        );
        assert!("text/csv".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_type_filter_parse() {
        let filter = TypeFilter::parse("Patient?gender=female&active=true").unwrap();
        assert_eq!(filter.resource_type, "Patient");
        assert_eq!(
            filter.params,
            vec![
                ("gender".to_string(), "female".to_string()),
                ("active".to_string(), "true".to_string())
            ]
        );

        let bare = TypeFilter::parse("Observation").unwrap();
        assert!(bare.params.is_empty());

        assert!(TypeFilter::parse("?gender=female").is_err());
        assert!(TypeFilter::parse("Patient?gender").is_err());
    }

    #[test]
    fn test_from_pairs() {
        let params = JobParameters::from_pairs(&pairs(&[
            ("fhir.tenant", "acme"),
            ("fhir.datastore", "default"),
            ("fhir.resourceTypes", "Patient, Observation"),
            ("fhir.search.since", "2024-01-01T00:00:00Z"),
            ("fhir.typeFilter", "Patient?gender=female,Patient?gender=male"),
            ("fhir.exportFormat", "application/fhir+ndjson"),
            ("fhir.source", "default"),
            ("fhir.pathPrefix", "job42"),
        ]))
        .unwrap();

        assert_eq!(params.resource_types, vec!["Patient", "Observation"]);
        assert!(params.since.is_some());
        assert!(params.till.is_none());
        assert_eq!(params.type_filters.len(), 2);
        assert_eq!(params.format, ExportFormat::Ndjson);
    }

    #[test]
    fn test_missing_required_key_is_fatal() {
        let err = JobParameters::from_pairs(&pairs(&[("fhir.tenant", "acme")])).unwrap_err();
        assert!(err.is_fatal_config());
    }

    #[test]
    fn test_malformed_since_is_fatal() {
        let err = JobParameters::from_pairs(&pairs(&[
            ("fhir.tenant", "acme"),
            ("fhir.datastore", "default"),
            ("fhir.resourceTypes", "Patient"),
            ("fhir.search.since", "last tuesday"),
            ("fhir.source", "default"),
        ]))
        .unwrap_err();
        assert!(err.is_fatal_config());
    }

    #[test]
    fn test_filters_for() {
        let params = JobParameters::from_pairs(&pairs(&[
            ("fhir.tenant", "acme"),
            ("fhir.datastore", "default"),
            ("fhir.resourceTypes", "Patient,Observation"),
            ("fhir.typeFilter", "Patient?gender=female,Patient?gender=male"),
            ("fhir.source", "default"),
        ]))
        .unwrap();

        assert_eq!(params.filters_for("Patient").len(), 2);
        // No clause for Observation: one unconstrained pass.
        let observation = params.filters_for("Observation");
        assert_eq!(observation.len(), 1);
        assert!(observation[0].is_empty());
    }
}

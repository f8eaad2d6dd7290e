//! Structured decomposition of offloaded-payload storage keys.

use std::collections::HashMap;
use std::fmt;

use crate::error::StorageError;

/// A resource type referenced either by database id or by name.
///
/// Stores that predate the type-id mapping keep names in their keys; newer
/// stores use the compact integer id. Both render into the same key format,
/// and [`TypeMaps`] converts between the two when available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    /// The resource type id from the relational tier.
    Id(i32),
    /// The resource type name (e.g. "Patient").
    Name(String),
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Id(id) => write!(f, "{id}"),
            TypeRef::Name(name) => f.write_str(name),
        }
    }
}

/// Bidirectional resource-type id <-> name maps.
#[derive(Debug, Clone, Default)]
pub struct TypeMaps {
    by_id: HashMap<i32, String>,
    by_name: HashMap<String, i32>,
}

impl TypeMaps {
    /// Creates an empty map set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one id/name pair.
    pub fn insert(&mut self, id: i32, name: impl Into<String>) {
        let name = name.into();
        self.by_id.insert(id, name.clone());
        self.by_name.insert(name, id);
    }

    /// Resolves a type id to its name.
    #[must_use]
    pub fn name_for(&self, id: i32) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    /// Resolves a type name to its id.
    #[must_use]
    pub fn id_for(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).copied()
    }
}

/// The decomposition of one offloaded-payload storage key.
///
/// Key format: `{resourceTypeIdOrName}/{logicalId}/{version}/{payloadKey?}`.
/// Resource type, logical id and version are always present. A name without
/// a payload key is "partial": it addresses no object and is only usable as
/// a scan prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobName {
    resource_type: TypeRef,
    logical_id: String,
    version: i32,
    payload_key: Option<String>,
}

impl BlobName {
    /// Starts building a blob name.
    #[must_use]
    pub fn builder() -> BlobNameBuilder {
        BlobNameBuilder::default()
    }

    /// Parses a storage key into its components.
    ///
    /// When `maps` is supplied, a leading all-digit segment is resolved to
    /// the mapped resource type name; without maps it stays an id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidBlobName` when the key does not have 3
    /// or 4 non-empty segments or the version is not an integer.
    pub fn parse(key: &str, maps: Option<&TypeMaps>) -> Result<Self, StorageError> {
        let trimmed = key.strip_suffix('/').unwrap_or(key);
        let segments: Vec<&str> = trimmed.split('/').collect();
        if !(3..=4).contains(&segments.len()) {
            return Err(StorageError::invalid_blob_name(
                key,
                format!("expected 3 or 4 segments, found {}", segments.len()),
            ));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(StorageError::invalid_blob_name(key, "empty segment"));
        }

        let type_segment = segments[0];
        let resource_type = if type_segment.bytes().all(|b| b.is_ascii_digit()) {
            let id: i32 = type_segment.parse().map_err(|_| {
                StorageError::invalid_blob_name(key, "resource type id out of range")
            })?;
            match maps.and_then(|m| m.name_for(id)) {
                Some(name) => TypeRef::Name(name.to_string()),
                None => TypeRef::Id(id),
            }
        } else {
            TypeRef::Name(type_segment.to_string())
        };

        let version: i32 = segments[2]
            .parse()
            .map_err(|_| StorageError::invalid_blob_name(key, "version is not an integer"))?;

        Ok(Self {
            resource_type,
            logical_id: segments[1].to_string(),
            version,
            payload_key: segments.get(3).map(|s| (*s).to_string()),
        })
    }

    /// The resource type reference.
    #[must_use]
    pub fn resource_type(&self) -> &TypeRef {
        &self.resource_type
    }

    /// The resource type name, when known.
    #[must_use]
    pub fn resource_type_name(&self) -> Option<&str> {
        match &self.resource_type {
            TypeRef::Name(name) => Some(name),
            TypeRef::Id(_) => None,
        }
    }

    /// The resource type id, when the key stored one.
    #[must_use]
    pub fn resource_type_id(&self) -> Option<i32> {
        match self.resource_type {
            TypeRef::Id(id) => Some(id),
            TypeRef::Name(_) => None,
        }
    }

    /// The logical id.
    #[must_use]
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    /// The resource version.
    #[must_use]
    pub fn version(&self) -> i32 {
        self.version
    }

    /// The payload key, absent for partial (scan prefix) names.
    #[must_use]
    pub fn payload_key(&self) -> Option<&str> {
        self.payload_key.as_deref()
    }

    /// Whether this name is a scan prefix rather than an addressable object.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.payload_key.is_none()
    }

    /// Renders the storage key. Partial names end in `/` so they can only
    /// be used as scan prefixes, never mistaken for object keys.
    #[must_use]
    pub fn to_blob_path(&self) -> String {
        match &self.payload_key {
            Some(payload_key) => format!(
                "{}/{}/{}/{}",
                self.resource_type, self.logical_id, self.version, payload_key
            ),
            None => format!("{}/{}/{}/", self.resource_type, self.logical_id, self.version),
        }
    }
}

impl fmt::Display for BlobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_blob_path())
    }
}

/// Builder for [`BlobName`].
#[derive(Debug, Default)]
pub struct BlobNameBuilder {
    resource_type: Option<TypeRef>,
    logical_id: Option<String>,
    version: Option<i32>,
    payload_key: Option<String>,
}

impl BlobNameBuilder {
    /// Sets the resource type by database id.
    #[must_use]
    pub fn resource_type_id(mut self, id: i32) -> Self {
        self.resource_type = Some(TypeRef::Id(id));
        self
    }

    /// Sets the resource type by name.
    #[must_use]
    pub fn resource_type_name(mut self, name: impl Into<String>) -> Self {
        self.resource_type = Some(TypeRef::Name(name.into()));
        self
    }

    /// Sets the logical id.
    #[must_use]
    pub fn logical_id(mut self, logical_id: impl Into<String>) -> Self {
        self.logical_id = Some(logical_id.into());
        self
    }

    /// Sets the version.
    #[must_use]
    pub fn version(mut self, version: i32) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the payload key. Optional; omitting it builds a scan prefix.
    #[must_use]
    pub fn payload_key(mut self, payload_key: impl Into<String>) -> Self {
        self.payload_key = Some(payload_key.into());
        self
    }

    /// Builds the name.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Internal` when resource type, logical id or
    /// version are missing - a name is unusable without all three.
    pub fn build(self) -> Result<BlobName, StorageError> {
        let resource_type = self
            .resource_type
            .ok_or_else(|| StorageError::internal("blob name requires a resource type"))?;
        let logical_id = self
            .logical_id
            .ok_or_else(|| StorageError::internal("blob name requires a logical id"))?;
        let version = self
            .version
            .ok_or_else(|| StorageError::internal("blob name requires a version"))?;
        Ok(BlobName {
            resource_type,
            logical_id,
            version,
            payload_key: self.payload_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_with_name() {
        let name = BlobName::builder()
            .resource_type_name("Patient")
            .logical_id("p1")
            .version(3)
            .payload_key("6a1f")
            .build()
            .unwrap();

        let parsed = BlobName::parse(&name.to_blob_path(), None).unwrap();
        assert_eq!(parsed, name);
        assert_eq!(parsed.resource_type_name(), Some("Patient"));
        assert_eq!(parsed.logical_id(), "p1");
        assert_eq!(parsed.version(), 3);
        assert!(!parsed.is_partial());
    }

    #[test]
    fn test_round_trip_with_id_and_maps() {
        let name = BlobName::builder()
            .resource_type_id(42)
            .logical_id("p1")
            .version(1)
            .payload_key("6a1f")
            .build()
            .unwrap();
        assert_eq!(name.to_blob_path(), "42/p1/1/6a1f");

        // Without maps the id is retained.
        let parsed = BlobName::parse("42/p1/1/6a1f", None).unwrap();
        assert_eq!(parsed.resource_type_id(), Some(42));

        // With maps the id resolves to a name; id and version survive.
        let mut maps = TypeMaps::new();
        maps.insert(42, "Patient");
        let parsed = BlobName::parse("42/p1/1/6a1f", Some(&maps)).unwrap();
        assert_eq!(parsed.resource_type_name(), Some("Patient"));
        assert_eq!(parsed.logical_id(), "p1");
        assert_eq!(parsed.version(), 1);
    }

    #[test]
    fn test_partial_name_is_scan_prefix() {
        let name = BlobName::builder()
            .resource_type_name("Patient")
            .logical_id("p1")
            .version(2)
            .build()
            .unwrap();
        assert!(name.is_partial());
        assert_eq!(name.to_blob_path(), "Patient/p1/2/");

        let parsed = BlobName::parse("Patient/p1/2/", None).unwrap();
        assert!(parsed.is_partial());
        assert_eq!(parsed.version(), 2);
    }

    #[test]
    fn test_parse_rejects_malformed_keys() {
        assert!(BlobName::parse("Patient/p1", None).is_err());
        assert!(BlobName::parse("Patient/p1/x/6a1f", None).is_err());
        assert!(BlobName::parse("Patient//1/6a1f", None).is_err());
        assert!(BlobName::parse("a/b/1/c/d", None).is_err());
    }

    #[test]
    fn test_builder_requires_core_fields() {
        let err = BlobName::builder().logical_id("p1").version(1).build();
        assert!(err.is_err());
    }

    #[test]
    fn test_type_maps() {
        let mut maps = TypeMaps::new();
        maps.insert(1, "Patient");
        maps.insert(2, "Observation");
        assert_eq!(maps.name_for(2), Some("Observation"));
        assert_eq!(maps.id_for("Patient"), Some(1));
        assert_eq!(maps.name_for(3), None);
    }
}

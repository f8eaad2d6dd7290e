//! Bulk data job configuration: partition bounds, paging, storage providers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// The kind of object storage backing an export destination or payload
/// offload source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Directory-backed store, one object per file under a root path.
    File,
    /// In-process store, used for tests and ephemeral jobs.
    Memory,
}

/// Configuration for one named storage provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageProviderConfig {
    /// Backend kind.
    pub kind: ProviderKind,

    /// Root directory for `File` providers; ignored for `Memory`.
    #[serde(default)]
    pub root: Option<String>,

    /// Destination container (bucket) name.
    pub container: String,

    /// Whether pagination against this provider can replay resources even
    /// with a single typeFilter (unstable page boundaries under concurrent
    /// writes). Forces in-memory deduplication in the export reader.
    #[serde(default)]
    pub duplicates_possible: bool,
}

/// Tenant-level bulk data configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkDataConfig {
    /// Upper bound on concurrently running partitions.
    #[serde(default = "default_max_partitions")]
    pub max_partitions: usize,

    /// Page size for export searches.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Resources accumulated before a part is pushed to the object store.
    #[serde(default = "default_max_objects_per_part")]
    pub max_objects_per_part: u64,

    /// Bytes accumulated before a part is pushed to the object store.
    #[serde(default = "default_max_part_size_bytes")]
    pub max_part_size_bytes: usize,

    /// Named storage providers, keyed by source id.
    #[serde(default)]
    pub provider: HashMap<String, StorageProviderConfig>,
}

fn default_max_partitions() -> usize {
    3
}

fn default_page_size() -> u32 {
    1000
}

fn default_max_objects_per_part() -> u64 {
    200_000
}

fn default_max_part_size_bytes() -> usize {
    200 * 1024 * 1024
}

impl Default for BulkDataConfig {
    fn default() -> Self {
        Self {
            max_partitions: default_max_partitions(),
            page_size: default_page_size(),
            max_objects_per_part: default_max_objects_per_part(),
            max_part_size_bytes: default_max_part_size_bytes(),
            provider: HashMap::new(),
        }
    }
}

impl BulkDataConfig {
    /// Looks up a provider by source id.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownProvider` when no provider with the
    /// given source id is configured.
    pub fn provider(&self, source_id: &str) -> Result<&StorageProviderConfig, ConfigError> {
        self.provider
            .get(source_id)
            .ok_or_else(|| ConfigError::UnknownProvider {
                source_id: source_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml() {
        let config: BulkDataConfig = toml::from_str(
            r#"
            max_partitions = 5
            page_size = 500

            [provider.default]
            kind = "file"
            root = "/var/lib/ferrofhir/export"
            container = "exports"

            [provider.flaky]
            kind = "memory"
            container = "exports"
            duplicates_possible = true
            "#,
        )
        .unwrap();

        assert_eq!(config.max_partitions, 5);
        assert_eq!(config.page_size, 500);
        assert_eq!(config.max_objects_per_part, 200_000);

        let default = config.provider("default").unwrap();
        assert_eq!(default.kind, ProviderKind::File);
        assert!(!default.duplicates_possible);

        let flaky = config.provider("flaky").unwrap();
        assert_eq!(flaky.kind, ProviderKind::Memory);
        assert!(flaky.duplicates_possible);
    }

    #[test]
    fn test_unknown_provider() {
        let config = BulkDataConfig::default();
        let err = config.provider("nope").unwrap_err();
        assert_eq!(err.to_string(), "Unknown storage provider: nope");
    }
}

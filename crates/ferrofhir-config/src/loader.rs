//! Loads tenant property groups from the configuration directory.

use std::path::{Path, PathBuf};

use ferrofhir_core::TenantDatasourceKey;
use tracing::debug;

use crate::bulkdata::BulkDataConfig;
use crate::datasource::DatasourceConfig;
use crate::properties::PropertyGroup;
use crate::ConfigError;

/// Loads per-tenant property groups from a directory tree.
///
/// Layout: `<config-dir>/<tenant-id>/<group>.toml`. A missing or invalid
/// group is a fatal [`ConfigError`]; callers treat it as a terminal request
/// or job failure and never retry.
#[derive(Debug, Clone)]
pub struct TenantConfigLoader {
    config_dir: PathBuf,
}

impl TenantConfigLoader {
    /// Creates a loader rooted at the given configuration directory.
    #[must_use]
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// The configuration directory this loader reads from.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Loads a raw property group for a tenant.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::GroupNotFound` when the file does not exist and
    /// `ConfigError::Parse` when it is not valid TOML.
    pub fn load_group(&self, tenant_id: &str, group: &str) -> Result<PropertyGroup, ConfigError> {
        let path = self.config_dir.join(tenant_id).join(format!("{group}.toml"));
        if !path.is_file() {
            return Err(ConfigError::group_not_found(tenant_id, group));
        }

        debug!(tenant_id, group, path = %path.display(), "Loading property group");
        let text = std::fs::read_to_string(&path)?;
        PropertyGroup::parse(path.display().to_string(), &text)
    }

    /// Loads the datasource configuration for a tenant/datastore pair.
    ///
    /// # Errors
    ///
    /// Propagates any group load failure; the caller treats it as fatal.
    pub fn load_datasource(
        &self,
        key: &TenantDatasourceKey,
    ) -> Result<DatasourceConfig, ConfigError> {
        let group = format!("datasource-{}", key.datastore_id);
        self.load_group(&key.tenant_id, &group)?.as_typed()
    }

    /// Loads the bulk data configuration for a tenant.
    ///
    /// A tenant without a `bulkdata.toml` group gets the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` when the group exists but is malformed.
    pub fn load_bulkdata(&self, tenant_id: &str) -> Result<BulkDataConfig, ConfigError> {
        match self.load_group(tenant_id, "bulkdata") {
            Ok(group) => group.as_typed(),
            Err(e) if e.is_group_not_found() => Ok(BulkDataConfig::default()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_tenant_file(dir: &Path, tenant: &str, name: &str, body: &str) {
        let tenant_dir = dir.join(tenant);
        fs::create_dir_all(&tenant_dir).unwrap();
        fs::write(tenant_dir.join(name), body).unwrap();
    }

    #[test]
    fn test_load_datasource() {
        let dir = tempfile::tempdir().unwrap();
        write_tenant_file(
            dir.path(),
            "acme",
            "datasource-default.toml",
            r#"
            flavor = "postgres"
            url = "postgres://localhost/acme"
            "#,
        );

        let loader = TenantConfigLoader::new(dir.path());
        let key = TenantDatasourceKey::new("acme", "default");
        let config = loader.load_datasource(&key).unwrap();
        assert_eq!(config.url, "postgres://localhost/acme");
    }

    #[test]
    fn test_missing_group_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let loader = TenantConfigLoader::new(dir.path());
        let key = TenantDatasourceKey::new("ghost", "default");
        let err = loader.load_datasource(&key).unwrap_err();
        assert!(err.is_group_not_found());
    }

    #[test]
    fn test_bulkdata_defaults_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("acme")).unwrap();
        let loader = TenantConfigLoader::new(dir.path());
        let config = loader.load_bulkdata("acme").unwrap();
        assert_eq!(config.page_size, 1000);
    }

    #[test]
    fn test_malformed_group() {
        let dir = tempfile::tempdir().unwrap();
        write_tenant_file(dir.path(), "acme", "bulkdata.toml", "max_partitions = [");
        let loader = TenantConfigLoader::new(dir.path());
        assert!(loader.load_bulkdata("acme").is_err());
    }
}

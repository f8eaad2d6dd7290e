//! Tenant property-group configuration.
//!
//! Each tenant's configuration lives in a directory of TOML property groups:
//!
//! ```text
//! <config-dir>/<tenant-id>/datasource-<datastore-id>.toml
//! <config-dir>/<tenant-id>/bulkdata.toml
//! ```
//!
//! Configuration errors are fatal for the request or job that triggered the
//! load: they are surfaced as [`ConfigError`] and never retried.

pub mod bulkdata;
pub mod datasource;
pub mod loader;
pub mod properties;

pub use bulkdata::{BulkDataConfig, ProviderKind, StorageProviderConfig};
pub use datasource::{CacheSizes, DatasourceConfig, DbFlavor};
pub use loader::TenantConfigLoader;
pub use properties::PropertyGroup;

/// Error types for configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Missing property: {path}")]
    MissingProperty { path: String },

    #[error("Property group not found for tenant '{tenant_id}': {group}")]
    GroupNotFound { tenant_id: String, group: String },

    #[error("Unsupported database flavor: {name}")]
    UnsupportedFlavor { name: String },

    #[error("Unknown storage provider: {source_id}")]
    UnknownProvider { source_id: String },
}

impl ConfigError {
    /// Creates a new Parse error.
    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new MissingProperty error.
    pub fn missing_property(path: impl Into<String>) -> Self {
        Self::MissingProperty { path: path.into() }
    }

    /// Creates a new GroupNotFound error.
    pub fn group_not_found(tenant_id: impl Into<String>, group: impl Into<String>) -> Self {
        Self::GroupNotFound {
            tenant_id: tenant_id.into(),
            group: group.into(),
        }
    }

    /// Returns `true` if the tenant's property group could not be located.
    #[must_use]
    pub fn is_group_not_found(&self) -> bool {
        matches!(self, Self::GroupNotFound { .. })
    }
}

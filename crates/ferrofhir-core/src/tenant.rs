//! Tenant and datastore identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Composite key selecting one isolated persistence context.
///
/// Every tenant may configure several datastores; caches, connection pools
/// and configuration property groups are all keyed by this pair. Two keys
/// differing in either field refer to fully independent state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantDatasourceKey {
    /// The tenant identifier (e.g. "default", "acme").
    pub tenant_id: String,
    /// The datastore identifier within the tenant (e.g. "default", "profile").
    pub datastore_id: String,
}

impl TenantDatasourceKey {
    /// Creates a new key for the given tenant and datastore.
    #[must_use]
    pub fn new(tenant_id: impl Into<String>, datastore_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            datastore_id: datastore_id.into(),
        }
    }
}

impl fmt::Display for TenantDatasourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.datastore_id)
    }
}

//! Lazily constructed, tenant-keyed cache registry.

use std::sync::Arc;

use dashmap::DashMap;
use ferrofhir_config::{ConfigError, TenantConfigLoader};
use ferrofhir_core::TenantDatasourceKey;
use tracing::info;

use crate::persistence::PersistenceCache;

/// Registry of [`PersistenceCache`] instances keyed by tenant + datastore.
///
/// The manager is an explicitly constructed dependency - build one at
/// startup and pass it where needed. The first request for a key loads the
/// datasource's configured cache sizes and constructs the instance; the
/// insert is atomic, so concurrent first requests agree on a single
/// instance. Instances are retained for the process lifetime (no eviction).
#[derive(Debug)]
pub struct CacheManager {
    loader: TenantConfigLoader,
    caches: DashMap<TenantDatasourceKey, Arc<PersistenceCache>>,
}

impl CacheManager {
    /// Creates a manager that sizes caches from the given config loader.
    #[must_use]
    pub fn new(loader: TenantConfigLoader) -> Self {
        Self {
            loader,
            caches: DashMap::new(),
        }
    }

    /// Returns the cache for a tenant/datastore pair, constructing it on
    /// first access.
    ///
    /// # Errors
    ///
    /// Returns the loader's [`ConfigError`] when the tenant's datasource
    /// property group cannot be loaded. This is fatal for the enclosing
    /// request and is not retried here.
    pub fn cache_for(
        &self,
        key: &TenantDatasourceKey,
    ) -> Result<Arc<PersistenceCache>, ConfigError> {
        if let Some(cache) = self.caches.get(key) {
            return Ok(cache.clone());
        }

        // Load outside the map entry so a slow config read never holds a
        // shard lock. Losing the insert race is fine: or_insert_with keeps
        // the winner and this construction is dropped.
        let config = self.loader.load_datasource(key)?;
        let entry = self
            .caches
            .entry(key.clone())
            .or_insert_with(|| {
                info!(key = %key, "Creating persistence cache");
                Arc::new(PersistenceCache::new(&config.cache))
            });
        Ok(entry.clone())
    }

    /// Number of distinct tenant/datastore caches constructed so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    /// Returns `true` when no cache has been constructed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}

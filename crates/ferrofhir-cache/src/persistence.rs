//! The per-tenant/datastore persistence cache.

use std::sync::atomic::{AtomicBool, Ordering};

use ferrofhir_config::CacheSizes;

use crate::idcache::IdCache;
use crate::session::CacheSession;

/// Identity of a normalized token value row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommonTokenValue {
    pub parameter_name_id: i32,
    pub code_system_id: i32,
    pub token_value: String,
}

impl CommonTokenValue {
    #[must_use]
    pub fn new(parameter_name_id: i32, code_system_id: i32, token_value: impl Into<String>) -> Self {
        Self {
            parameter_name_id,
            code_system_id,
            token_value: token_value.into(),
        }
    }
}

/// Identity of one logical resource: (resource type id, logical id).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalResourceIdent {
    pub resource_type_id: i32,
    pub logical_id: String,
}

impl LogicalResourceIdent {
    #[must_use]
    pub fn new(resource_type_id: i32, logical_id: impl Into<String>) -> Self {
        Self {
            resource_type_id,
            logical_id: logical_id.into(),
        }
    }
}

/// Shared id caches for one (tenant, datastore) pair.
///
/// One instance exists per distinct pair, created once and retained for the
/// process lifetime; concurrent requests for the same tenant share it. The
/// individual maps are internally synchronized, so readers never block each
/// other; writes arrive only through [`CacheSession::commit`].
///
/// `needs_prefill` guards a one-time warm load that must complete before
/// the first insert against this datasource. Serving inserts before the
/// prefill could publish ids for rows a concurrent transaction has not yet
/// committed, so this is an ordering invariant, not a performance option.
#[derive(Debug)]
pub struct PersistenceCache {
    resource_types: IdCache<String>,
    parameter_names: IdCache<String>,
    code_systems: IdCache<String>,
    token_values: IdCache<CommonTokenValue>,
    logical_resource_idents: IdCache<LogicalResourceIdent>,
    needs_prefill: AtomicBool,
}

impl PersistenceCache {
    /// Creates a cache sized by the datasource's configured bounds.
    #[must_use]
    pub fn new(sizes: &CacheSizes) -> Self {
        Self {
            resource_types: IdCache::new(sizes.resource_type_cache_size),
            parameter_names: IdCache::new(sizes.parameter_name_cache_size),
            code_systems: IdCache::new(sizes.external_system_cache_size),
            token_values: IdCache::new(sizes.external_value_cache_size),
            logical_resource_idents: IdCache::new(sizes.logical_resource_ident_cache_size),
            needs_prefill: AtomicBool::new(true),
        }
    }

    /// Opens a staging session for one database transaction.
    #[must_use]
    pub fn session(self: &std::sync::Arc<Self>) -> CacheSession {
        CacheSession::new(self.clone())
    }

    /// Whether the one-time warm load has not run yet.
    ///
    /// Returns `true` at most once per cache instance; the caller that
    /// observes `true` owns the prefill and must complete it before
    /// inserting any new rows.
    pub fn needs_prefill(&self) -> bool {
        self.needs_prefill.swap(false, Ordering::AcqRel)
    }

    /// Re-arms the prefill guard, forcing the next caller to warm the cache.
    ///
    /// Used after a rollback that may have left the shared maps cold.
    pub fn set_needs_prefill(&self) {
        self.needs_prefill.store(true, Ordering::Release);
    }

    /// Resource type name -> id cache.
    pub fn resource_types(&self) -> &IdCache<String> {
        &self.resource_types
    }

    /// Search parameter name -> id cache.
    pub fn parameter_names(&self) -> &IdCache<String> {
        &self.parameter_names
    }

    /// Code system (external system name) -> id cache.
    pub fn code_systems(&self) -> &IdCache<String> {
        &self.code_systems
    }

    /// Common token value -> id cache.
    pub fn token_values(&self) -> &IdCache<CommonTokenValue> {
        &self.token_values
    }

    /// Logical resource identity -> logical_resource_id cache.
    pub fn logical_resource_idents(&self) -> &IdCache<LogicalResourceIdent> {
        &self.logical_resource_idents
    }

    /// Drops every cached id for this datasource and re-arms the prefill.
    pub fn invalidate_all(&self) {
        self.resource_types.clear();
        self.parameter_names.clear();
        self.code_systems.clear();
        self.token_values.clear();
        self.logical_resource_idents.clear();
        self.set_needs_prefill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefill_guard_fires_once() {
        let cache = PersistenceCache::new(&CacheSizes::default());
        assert!(cache.needs_prefill());
        assert!(!cache.needs_prefill());

        cache.set_needs_prefill();
        assert!(cache.needs_prefill());
    }

    #[test]
    fn test_invalidate_all() {
        let cache = PersistenceCache::new(&CacheSizes::default());
        assert!(cache.needs_prefill());
        cache.resource_types().insert("Patient".to_string(), 1);
        cache
            .code_systems()
            .insert("http://loinc.org".to_string(), 7);

        cache.invalidate_all();

        assert!(cache.resource_types().is_empty());
        assert!(cache.code_systems().is_empty());
        assert!(cache.needs_prefill());
    }
}

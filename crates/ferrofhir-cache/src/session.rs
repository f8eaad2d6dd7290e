//! Per-transaction cache staging.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::persistence::{CommonTokenValue, LogicalResourceIdent, PersistenceCache};

/// Staged cache state for one open database transaction.
///
/// Lookups consult the staged maps first, then fall through to the shared
/// cache, so a transaction always sees the ids it assigned itself. Ids
/// created inside the transaction are staged here and published to the
/// shared cache only by [`CacheSession::commit`]; [`CacheSession::rollback`]
/// discards them. Exactly one of the two MUST be called before the
/// enclosing connection is released - the session consumes itself to make
/// skipping both hard to do silently.
#[derive(Debug)]
pub struct CacheSession {
    shared: Arc<PersistenceCache>,
    resource_types: HashMap<String, i64>,
    parameter_names: HashMap<String, i64>,
    code_systems: HashMap<String, i64>,
    token_values: HashMap<CommonTokenValue, i64>,
    logical_resource_idents: HashMap<LogicalResourceIdent, i64>,
}

impl CacheSession {
    pub(crate) fn new(shared: Arc<PersistenceCache>) -> Self {
        Self {
            shared,
            resource_types: HashMap::new(),
            parameter_names: HashMap::new(),
            code_systems: HashMap::new(),
            token_values: HashMap::new(),
            logical_resource_idents: HashMap::new(),
        }
    }

    /// The shared cache this session stages against.
    #[must_use]
    pub fn shared(&self) -> &Arc<PersistenceCache> {
        &self.shared
    }

    /// Looks up a resource type id, staged values first.
    pub fn resource_type_id(&self, name: &str) -> Option<i64> {
        self.resource_types
            .get(name)
            .copied()
            .or_else(|| self.shared.resource_types().get(&name.to_string()))
    }

    /// Stages a resource type id assigned in this transaction.
    pub fn stage_resource_type(&mut self, name: impl Into<String>, id: i64) {
        self.resource_types.insert(name.into(), id);
    }

    /// Looks up a parameter name id, staged values first.
    pub fn parameter_name_id(&self, name: &str) -> Option<i64> {
        self.parameter_names
            .get(name)
            .copied()
            .or_else(|| self.shared.parameter_names().get(&name.to_string()))
    }

    /// Stages a parameter name id assigned in this transaction.
    pub fn stage_parameter_name(&mut self, name: impl Into<String>, id: i64) {
        self.parameter_names.insert(name.into(), id);
    }

    /// Looks up a code system id, staged values first.
    pub fn code_system_id(&self, name: &str) -> Option<i64> {
        self.code_systems
            .get(name)
            .copied()
            .or_else(|| self.shared.code_systems().get(&name.to_string()))
    }

    /// Stages a code system id assigned in this transaction.
    pub fn stage_code_system(&mut self, name: impl Into<String>, id: i64) {
        self.code_systems.insert(name.into(), id);
    }

    /// Looks up a common token value id, staged values first.
    pub fn token_value_id(&self, key: &CommonTokenValue) -> Option<i64> {
        self.token_values
            .get(key)
            .copied()
            .or_else(|| self.shared.token_values().get(key))
    }

    /// Stages a common token value id assigned in this transaction.
    pub fn stage_token_value(&mut self, key: CommonTokenValue, id: i64) {
        self.token_values.insert(key, id);
    }

    /// Looks up a logical resource id, staged values first.
    pub fn logical_resource_id(&self, key: &LogicalResourceIdent) -> Option<i64> {
        self.logical_resource_idents
            .get(key)
            .copied()
            .or_else(|| self.shared.logical_resource_idents().get(key))
    }

    /// Stages a logical resource id assigned in this transaction.
    pub fn stage_logical_resource(&mut self, key: LogicalResourceIdent, id: i64) {
        self.logical_resource_idents.insert(key, id);
    }

    /// Publishes every staged id to the shared cache.
    ///
    /// Call when the enclosing database transaction has committed. Staged
    /// ids become visible to other requests for the same tenant only now,
    /// so the shared cache never holds ids from uncommitted rows.
    pub fn commit(self) {
        let staged = self.resource_types.len()
            + self.parameter_names.len()
            + self.code_systems.len()
            + self.token_values.len()
            + self.logical_resource_idents.len();

        for (name, id) in self.resource_types {
            self.shared.resource_types().insert(name, id);
        }
        for (name, id) in self.parameter_names {
            self.shared.parameter_names().insert(name, id);
        }
        for (name, id) in self.code_systems {
            self.shared.code_systems().insert(name, id);
        }
        for (key, id) in self.token_values {
            self.shared.token_values().insert(key, id);
        }
        for (key, id) in self.logical_resource_idents {
            self.shared.logical_resource_idents().insert(key, id);
        }

        if staged > 0 {
            debug!(staged, "Published staged cache entries on commit");
        }
    }

    /// Discards every staged id.
    ///
    /// Call when the enclosing database transaction rolled back. The shared
    /// cache is untouched; only this transaction's staged ids are lost.
    pub fn rollback(self) {
        let staged = self.resource_types.len()
            + self.parameter_names.len()
            + self.code_systems.len()
            + self.token_values.len()
            + self.logical_resource_idents.len();
        if staged > 0 {
            debug!(staged, "Discarded staged cache entries on rollback");
        }
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrofhir_config::CacheSizes;

    fn shared_cache() -> Arc<PersistenceCache> {
        Arc::new(PersistenceCache::new(&CacheSizes::default()))
    }

    #[test]
    fn test_staged_values_visible_within_session_only() {
        let shared = shared_cache();
        let mut session = shared.session();

        session.stage_code_system("http://loinc.org", 42);
        assert_eq!(session.code_system_id("http://loinc.org"), Some(42));
        // Not yet published.
        assert_eq!(shared.code_systems().get(&"http://loinc.org".to_string()), None);
    }

    #[test]
    fn test_commit_publishes() {
        let shared = shared_cache();
        let mut session = shared.session();
        session.stage_code_system("http://loinc.org", 42);
        session.stage_token_value(CommonTokenValue::new(1, 42, "1234-5"), 99);
        session.commit();

        assert_eq!(
            shared.code_systems().get(&"http://loinc.org".to_string()),
            Some(42)
        );
        assert_eq!(
            shared
                .token_values()
                .get(&CommonTokenValue::new(1, 42, "1234-5")),
            Some(99)
        );
    }

    #[test]
    fn test_rollback_discards() {
        let shared = shared_cache();
        let mut session = shared.session();
        session.stage_resource_type("Patient", 1);
        session.rollback();

        assert_eq!(shared.resource_types().get(&"Patient".to_string()), None);
    }

    #[test]
    fn test_fallthrough_to_shared() {
        let shared = shared_cache();
        shared.parameter_names().insert("code".to_string(), 17);

        let session = shared.session();
        assert_eq!(session.parameter_name_id("code"), Some(17));
    }

    #[test]
    fn test_staged_shadows_shared() {
        let shared = shared_cache();
        shared.resource_types().insert("Patient".to_string(), 1);

        let mut session = shared.session();
        session.stage_resource_type("Patient", 2);
        assert_eq!(session.resource_type_id("Patient"), Some(2));
    }
}

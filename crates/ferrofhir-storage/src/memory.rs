//! In-memory store implementations.
//!
//! Used by tests and by the `memory` storage provider kind for ephemeral
//! jobs. Both types are internally synchronized and cheap to share.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use ferrofhir_core::ExportedResource;
use serde_json::Value;
use uuid::Uuid;

use crate::error::StorageError;
use crate::traits::{ObjectStore, ScanPage, SearchBackend, SearchPage, SearchQuery};

#[derive(Debug)]
struct PendingUpload {
    container: String,
    key: String,
    parts: BTreeMap<u32, Vec<u8>>,
}

/// An in-process object store.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    containers: Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>,
    uploads: Mutex<HashMap<String, PendingUpload>>,
}

impl MemoryObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects in a container. Test helper.
    #[must_use]
    pub fn object_count(&self, container: &str) -> usize {
        self.containers
            .lock()
            .expect("poisoned lock")
            .get(container)
            .map_or(0, BTreeMap::len)
    }

    fn lock_containers(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, BTreeMap<String, Vec<u8>>>> {
        self.containers.lock().expect("poisoned lock")
    }

    fn lock_uploads(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingUpload>> {
        self.uploads.lock().expect("poisoned lock")
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn ensure_container(&self, container: &str) -> Result<(), StorageError> {
        self.lock_containers()
            .entry(container.to_string())
            .or_default();
        Ok(())
    }

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<(), StorageError> {
        self.lock_containers()
            .entry(container.to_string())
            .or_default()
            .insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get_object(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .lock_containers()
            .get(container)
            .and_then(|objects| objects.get(key).cloned()))
    }

    async fn delete_object(&self, container: &str, key: &str) -> Result<(), StorageError> {
        if let Some(objects) = self.lock_containers().get_mut(container) {
            objects.remove(key);
        }
        Ok(())
    }

    async fn begin_multipart(&self, container: &str, key: &str) -> Result<String, StorageError> {
        let upload_id = Uuid::new_v4().to_string();
        self.lock_uploads().insert(
            upload_id.clone(),
            PendingUpload {
                container: container.to_string(),
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        upload_id: &str,
        part_number: u32,
        bytes: Vec<u8>,
    ) -> Result<(), StorageError> {
        let mut uploads = self.lock_uploads();
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| StorageError::unknown_upload(upload_id))?;
        upload.parts.insert(part_number, bytes);
        Ok(())
    }

    async fn complete_multipart(&self, upload_id: &str) -> Result<(), StorageError> {
        let upload = self
            .lock_uploads()
            .remove(upload_id)
            .ok_or_else(|| StorageError::unknown_upload(upload_id))?;

        let mut assembled = Vec::new();
        for bytes in upload.parts.into_values() {
            assembled.extend_from_slice(&bytes);
        }
        self.lock_containers()
            .entry(upload.container)
            .or_default()
            .insert(upload.key, assembled);
        Ok(())
    }

    async fn abort_multipart(&self, upload_id: &str) -> Result<(), StorageError> {
        self.lock_uploads()
            .remove(upload_id)
            .ok_or_else(|| StorageError::unknown_upload(upload_id))?;
        Ok(())
    }

    async fn scan_page(
        &self,
        container: &str,
        continuation: Option<&str>,
        page_size: usize,
    ) -> Result<ScanPage, StorageError> {
        let containers = self.lock_containers();
        let Some(objects) = containers.get(container) else {
            return Ok(ScanPage::default());
        };

        let keys: Vec<String> = match continuation {
            Some(after) => objects
                .range::<str, _>((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
                .take(page_size)
                .map(|(k, _)| k.clone())
                .collect(),
            None => objects.keys().take(page_size).cloned().collect(),
        };

        let continuation = if keys.len() == page_size {
            keys.last().cloned()
        } else {
            None
        };

        Ok(ScanPage { keys, continuation })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// An in-process search backend over seeded resources.
///
/// Filters match top-level body fields by string equality, which is all the
/// export pipeline needs from a test double. Pagination is deterministic:
/// results sort on (last-modified, logical id) like the relational backend.
#[derive(Debug, Default)]
pub struct MemorySearchBackend {
    resources: Mutex<Vec<ExportedResource>>,
}

impl MemorySearchBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds one resource.
    pub fn insert(&self, resource: ExportedResource) {
        self.resources.lock().expect("poisoned lock").push(resource);
    }

    /// Seeds many resources.
    pub fn insert_all(&self, resources: impl IntoIterator<Item = ExportedResource>) {
        self.resources
            .lock()
            .expect("poisoned lock")
            .extend(resources);
    }

    fn matches(resource: &ExportedResource, query: &SearchQuery) -> bool {
        if resource.resource_type != query.resource_type {
            return false;
        }
        if let Some(since) = query.since
            && resource.last_modified < since
        {
            return false;
        }
        if let Some(till) = query.till
            && resource.last_modified >= till
        {
            return false;
        }
        query.filters.iter().all(|(key, expected)| {
            match resource.body.get(key) {
                Some(Value::String(s)) => s == expected,
                Some(other) => other.to_string() == *expected,
                None => false,
            }
        })
    }
}

#[async_trait]
impl SearchBackend for MemorySearchBackend {
    async fn search_page(&self, query: &SearchQuery) -> Result<SearchPage, StorageError> {
        let mut matching: Vec<ExportedResource> = self
            .resources
            .lock()
            .expect("poisoned lock")
            .iter()
            .filter(|r| Self::matches(r, query))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.logical_id.cmp(&b.logical_id))
        });

        let total = matching.len() as u64;
        let page_size = query.page_size.max(1) as u64;
        let last_page = total.div_ceil(page_size) as u32;

        let start = (u64::from(query.page.saturating_sub(1)) * page_size) as usize;
        let resources = matching
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect();

        Ok(SearchPage {
            resources,
            last_page,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::OffsetDateTime;

    fn resource(id: &str, ts: i64) -> ExportedResource {
        ExportedResource::new(
            "Patient",
            id,
            OffsetDateTime::from_unix_timestamp(ts).unwrap(),
            json!({"resourceType": "Patient", "id": id, "gender": "female"}),
        )
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryObjectStore::new();
        store.ensure_container("exports").await.unwrap();
        store
            .put_object("exports", "a/b", b"hello".to_vec())
            .await
            .unwrap();

        assert_eq!(
            store.get_object("exports", "a/b").await.unwrap(),
            Some(b"hello".to_vec())
        );
        assert_eq!(store.get_object("exports", "a/missing").await.unwrap(), None);

        store.delete_object("exports", "a/b").await.unwrap();
        assert_eq!(store.get_object("exports", "a/b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_multipart_assembles_in_order() {
        let store = MemoryObjectStore::new();
        let upload_id = store.begin_multipart("exports", "big").await.unwrap();
        store
            .upload_part(&upload_id, 1, b"one".to_vec())
            .await
            .unwrap();
        store
            .upload_part(&upload_id, 2, b"two".to_vec())
            .await
            .unwrap();
        store.complete_multipart(&upload_id).await.unwrap();

        assert_eq!(
            store.get_object("exports", "big").await.unwrap(),
            Some(b"onetwo".to_vec())
        );
    }

    #[tokio::test]
    async fn test_abort_discards_parts() {
        let store = MemoryObjectStore::new();
        let upload_id = store.begin_multipart("exports", "gone").await.unwrap();
        store
            .upload_part(&upload_id, 1, b"x".to_vec())
            .await
            .unwrap();
        store.abort_multipart(&upload_id).await.unwrap();

        assert_eq!(store.get_object("exports", "gone").await.unwrap(), None);
        assert!(store.upload_part(&upload_id, 2, vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_scan_pages_with_continuation() {
        let store = MemoryObjectStore::new();
        for key in ["a", "b", "c", "d", "e"] {
            store.put_object("c1", key, vec![]).await.unwrap();
        }

        let page1 = store.scan_page("c1", None, 2).await.unwrap();
        assert_eq!(page1.keys, vec!["a", "b"]);
        assert_eq!(page1.continuation.as_deref(), Some("b"));

        let page2 = store.scan_page("c1", Some("b"), 2).await.unwrap();
        assert_eq!(page2.keys, vec!["c", "d"]);

        let page3 = store
            .scan_page("c1", page2.continuation.as_deref(), 2)
            .await
            .unwrap();
        assert_eq!(page3.keys, vec!["e"]);
        assert!(page3.continuation.is_none());
    }

    #[tokio::test]
    async fn test_search_pagination_and_bounds() {
        let backend = MemorySearchBackend::new();
        backend.insert_all((0..5).map(|i| resource(&format!("p{i}"), 1000 + i)));

        let query = SearchQuery {
            resource_type: "Patient".to_string(),
            filters: vec![],
            since: Some(OffsetDateTime::from_unix_timestamp(1001).unwrap()),
            till: Some(OffsetDateTime::from_unix_timestamp(1004).unwrap()),
            page: 1,
            page_size: 2,
        };
        let page = backend.search_page(&query).await.unwrap();
        // ge 1001 and lt 1004 leaves p1, p2, p3.
        assert_eq!(page.total, 3);
        assert_eq!(page.last_page, 2);
        assert_eq!(page.resources.len(), 2);
        assert_eq!(page.resources[0].logical_id, "p1");
    }

    #[tokio::test]
    async fn test_search_filters() {
        let backend = MemorySearchBackend::new();
        backend.insert(resource("p0", 1000));

        let mut query = SearchQuery {
            resource_type: "Patient".to_string(),
            filters: vec![("gender".to_string(), "female".to_string())],
            since: None,
            till: None,
            page: 1,
            page_size: 10,
        };
        assert_eq!(backend.search_page(&query).await.unwrap().total, 1);

        query.filters = vec![("gender".to_string(), "male".to_string())];
        let page = backend.search_page(&query).await.unwrap();
        assert_eq!(page.total, 0);
        assert_eq!(page.last_page, 0);
    }
}

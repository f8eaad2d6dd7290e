//! Traits at the boundaries of the pipeline crates.

use async_trait::async_trait;
use ferrofhir_core::ExportedResource;
use time::OffsetDateTime;

use crate::error::StorageError;

/// One page of object keys from a container scan.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    /// Keys in lexicographic order.
    pub keys: Vec<String>,
    /// Token resuming the scan after the last key, absent when exhausted.
    pub continuation: Option<String>,
}

/// An object store holding offloaded payloads and export output.
///
/// Implementations must be thread-safe (`Send + Sync`). Reads of absent
/// objects return `Ok(None)` - absence is a soft result, not an error.
/// Multipart uploads are sequential per upload id: parts are uploaded in
/// ascending part number by a single caller.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Creates the container if it does not exist. Idempotent.
    async fn ensure_container(&self, container: &str) -> Result<(), StorageError>;

    /// Writes a complete object, replacing any existing one.
    async fn put_object(
        &self,
        container: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<(), StorageError>;

    /// Reads a complete object. Absent objects return `Ok(None)`.
    async fn get_object(&self, container: &str, key: &str)
        -> Result<Option<Vec<u8>>, StorageError>;

    /// Deletes an object. Deleting an absent object is a no-op.
    async fn delete_object(&self, container: &str, key: &str) -> Result<(), StorageError>;

    /// Starts a multipart upload for the given key, returning an upload id.
    async fn begin_multipart(&self, container: &str, key: &str) -> Result<String, StorageError>;

    /// Uploads one part of an open multipart upload.
    async fn upload_part(
        &self,
        upload_id: &str,
        part_number: u32,
        bytes: Vec<u8>,
    ) -> Result<(), StorageError>;

    /// Completes a multipart upload, making the object visible.
    async fn complete_multipart(&self, upload_id: &str) -> Result<(), StorageError>;

    /// Aborts a multipart upload, discarding uploaded parts.
    async fn abort_multipart(&self, upload_id: &str) -> Result<(), StorageError>;

    /// Lists one page of keys in lexicographic order, resuming after the
    /// continuation token when given.
    async fn scan_page(
        &self,
        container: &str,
        continuation: Option<&str>,
        page_size: usize,
    ) -> Result<ScanPage, StorageError>;

    /// The name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

/// One paginated export search.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// The resource type to search.
    pub resource_type: String,
    /// Search parameter key/value pairs from the active typeFilter.
    pub filters: Vec<(String, String)>,
    /// Inclusive lower bound (`ge`) on last-modified.
    pub since: Option<OffsetDateTime>,
    /// Exclusive upper bound (`lt`) on last-modified.
    pub till: Option<OffsetDateTime>,
    /// 1-based page number.
    pub page: u32,
    /// Page size.
    pub page_size: u32,
}

/// The result of one paginated export search.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// The matching resources for this page.
    pub resources: Vec<ExportedResource>,
    /// The last page number for this query; 0 when nothing matches.
    pub last_page: u32,
    /// Total matching resources for this query.
    pub total: u64,
}

/// Executes export searches with deterministic pagination.
///
/// Implementations MUST sort on (last-modified, logical id) so page
/// boundaries are stable across calls, and MUST run each call inside its
/// own transaction. Persistence failures propagate unchanged - retry and
/// stop policy belongs to the enclosing job driver.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Returns one page of resources matching the query.
    async fn search_page(&self, query: &SearchQuery) -> Result<SearchPage, StorageError>;
}

/// The relational existence check used by payload reconciliation.
#[async_trait]
pub trait ResourceIndex: Send + Sync {
    /// Whether a resource version row exists in the relational tier.
    ///
    /// Runs in its own transaction; a blob record with no matching row is
    /// an orphan.
    async fn version_exists(
        &self,
        resource_type: &str,
        logical_id: &str,
        version: i32,
    ) -> Result<bool, StorageError>;
}

// Compile-time object-safety checks.
#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_object_store_object_safe(_: &dyn ObjectStore) {}
    fn _assert_search_backend_object_safe(_: &dyn SearchBackend) {}
    fn _assert_resource_index_object_safe(_: &dyn ResourceIndex) {}
}

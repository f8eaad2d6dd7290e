//! Payload reconciliation: find and remove orphaned offload records.
//!
//! Every resource version physically present in offload storage must have a
//! corresponding relational record; a blob with no matching row is an
//! orphan left behind by a failed or partial write. The scanner pages
//! through the container with a provider continuation token, checks each
//! parsed record against the relational index, and - outside dry-run mode -
//! deletes confirmed orphans. A wall-clock budget stops the scan early with
//! a resumable token; the token is always logged in a greppable
//! `reconcile continuation-token=...` form so an operator can restart the
//! scan after a failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ferrofhir_storage::{BlobName, ObjectStore, ResourceIndex, TypeMaps};
use tracing::{info, warn};

/// Errors that can occur during a reconciliation scan.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// A store or index failure. Aborts the current page; pages already
    /// processed stay processed, and the scan resumes from the last logged
    /// continuation token.
    #[error("Storage error: {0}")]
    Storage(#[from] ferrofhir_storage::StorageError),
}

/// Options for one reconciliation invocation.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Token from a previous invocation to resume after.
    pub continuation_token: Option<String>,
    /// Wall-clock budget; the scan stops early once exceeded.
    pub max_scan_seconds: u64,
    /// Blob keys fetched per page.
    pub page_size: usize,
    /// When `true`, orphans are reported but never deleted.
    pub dry_run: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            continuation_token: None,
            max_scan_seconds: 120,
            page_size: 1000,
            dry_run: true,
        }
    }
}

/// Outcome of one reconciliation invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Blob records examined.
    pub scanned: u64,
    /// Records with no matching relational row.
    pub orphans: u64,
    /// Orphans actually deleted (always 0 in dry-run mode).
    pub deleted: u64,
    /// Token to resume from, present when the budget stopped the scan.
    pub continuation: Option<String>,
}

/// The reconciliation scanner.
pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    index: Arc<dyn ResourceIndex>,
    container: String,
    type_maps: Option<TypeMaps>,
}

impl Reconciler {
    /// Creates a scanner over one container.
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        index: Arc<dyn ResourceIndex>,
        container: impl Into<String>,
        type_maps: Option<TypeMaps>,
    ) -> Self {
        Self {
            store,
            index,
            container: container.into(),
            type_maps,
        }
    }

    /// Runs one scan within the configured budget.
    ///
    /// # Errors
    ///
    /// Index or store failures abort the current page and propagate after
    /// logging the resumable continuation token. Unparseable keys are
    /// logged and skipped, not fatal.
    pub async fn run(&self, options: &ReconcileOptions) -> Result<ReconcileSummary, ReconcileError> {
        let deadline = Instant::now() + Duration::from_secs(options.max_scan_seconds);
        let mut summary = ReconcileSummary::default();
        let mut token = options.continuation_token.clone();

        info!(
            container = %self.container,
            dry_run = options.dry_run,
            resume = token.as_deref().unwrap_or("-"),
            "Reconciliation scan starting"
        );

        loop {
            // The token that started this page: the resume point if
            // anything in the page fails.
            let page_token = token.clone();
            let page = self
                .store
                .scan_page(&self.container, page_token.as_deref(), options.page_size)
                .await?;

            for key in &page.keys {
                summary.scanned += 1;
                if let Err(e) = self.reconcile_key(key, options.dry_run, &mut summary).await {
                    Self::log_continuation(page_token.as_deref());
                    return Err(e);
                }
            }

            token = page.continuation;
            let Some(resume) = token.as_deref() else {
                break;
            };
            if Instant::now() >= deadline {
                Self::log_continuation(Some(resume));
                summary.continuation = token;
                break;
            }
        }

        info!(
            scanned = summary.scanned,
            orphans = summary.orphans,
            deleted = summary.deleted,
            complete = summary.continuation.is_none(),
            "Reconciliation scan finished"
        );
        Ok(summary)
    }

    async fn reconcile_key(
        &self,
        key: &str,
        dry_run: bool,
        summary: &mut ReconcileSummary,
    ) -> Result<(), ReconcileError> {
        let name = match BlobName::parse(key, self.type_maps.as_ref()) {
            Ok(name) if !name.is_partial() => name,
            Ok(_) => {
                warn!(key, "Skipping partial blob name");
                return Ok(());
            }
            Err(e) => {
                warn!(key, error = %e, "Skipping unparseable blob key");
                return Ok(());
            }
        };

        let Some(resource_type) = name.resource_type_name().map(str::to_string) else {
            warn!(key, "Skipping key with unmapped resource type id");
            return Ok(());
        };

        let exists = self
            .index
            .version_exists(&resource_type, name.logical_id(), name.version())
            .await?;
        if exists {
            return Ok(());
        }

        summary.orphans += 1;
        info!(
            key,
            resource_type = %resource_type,
            logical_id = name.logical_id(),
            version = name.version(),
            dry_run,
            "Orphaned payload record"
        );

        if !dry_run {
            self.store.delete_object(&self.container, key).await?;
            summary.deleted += 1;
        }
        Ok(())
    }

    fn log_continuation(token: Option<&str>) {
        // Deliberately greppable: operators recover interrupted scans by
        // searching the logs for this exact prefix.
        info!("reconcile continuation-token={}", token.unwrap_or(""));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ferrofhir_storage::{MemoryObjectStore, StorageError};
    use std::collections::HashSet;

    struct StubIndex {
        existing: HashSet<(String, String, i32)>,
        fail: bool,
    }

    impl StubIndex {
        fn with_existing(entries: &[(&str, &str, i32)]) -> Self {
            Self {
                existing: entries
                    .iter()
                    .map(|(t, l, v)| ((*t).to_string(), (*l).to_string(), *v))
                    .collect(),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                existing: HashSet::new(),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl ResourceIndex for StubIndex {
        async fn version_exists(
            &self,
            resource_type: &str,
            logical_id: &str,
            version: i32,
        ) -> Result<bool, StorageError> {
            if self.fail {
                return Err(StorageError::backend("index unavailable"));
            }
            Ok(self.existing.contains(&(
                resource_type.to_string(),
                logical_id.to_string(),
                version,
            )))
        }
    }

    async fn seeded_store() -> Arc<MemoryObjectStore> {
        let store = Arc::new(MemoryObjectStore::new());
        for key in ["Patient/p1/1/aaa", "Patient/p2/1/bbb", "Observation/o1/2/ccc"] {
            store
                .put_object("payloads", key, b"{}".to_vec())
                .await
                .unwrap();
        }
        store
    }

    fn options(dry_run: bool) -> ReconcileOptions {
        ReconcileOptions {
            continuation_token: None,
            max_scan_seconds: 60,
            page_size: 2,
            dry_run,
        }
    }

    #[tokio::test]
    async fn test_dry_run_reports_but_never_deletes() {
        let store = seeded_store().await;
        let index = Arc::new(StubIndex::with_existing(&[
            ("Patient", "p1", 1),
            ("Observation", "o1", 2),
        ]));
        let reconciler = Reconciler::new(store.clone(), index, "payloads", None);

        let summary = reconciler.run(&options(true)).await.unwrap();
        assert_eq!(summary.scanned, 3);
        assert_eq!(summary.orphans, 1);
        assert_eq!(summary.deleted, 0);
        assert!(summary.continuation.is_none());

        // The orphan is still there.
        assert!(
            store
                .get_object("payloads", "Patient/p2/1/bbb")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_confirmed_orphan_is_deleted_exactly_once() {
        let store = seeded_store().await;
        let index = Arc::new(StubIndex::with_existing(&[
            ("Patient", "p1", 1),
            ("Observation", "o1", 2),
        ]));
        let reconciler = Reconciler::new(store.clone(), index, "payloads", None);

        let summary = reconciler.run(&options(false)).await.unwrap();
        assert_eq!(summary.orphans, 1);
        assert_eq!(summary.deleted, 1);

        // A subsequent existence check comes back empty.
        assert!(
            store
                .get_object("payloads", "Patient/p2/1/bbb")
                .await
                .unwrap()
                .is_none()
        );

        // Running again finds nothing to delete.
        let again = reconciler.run(&options(false)).await.unwrap();
        assert_eq!(again.orphans, 0);
        assert_eq!(again.deleted, 0);
    }

    #[tokio::test]
    async fn test_budget_stop_yields_continuation_token() {
        let store = seeded_store().await;
        let index = Arc::new(StubIndex::with_existing(&[("Patient", "p1", 1)]));
        let reconciler = Reconciler::new(store, index, "payloads", None);

        let summary = reconciler
            .run(&ReconcileOptions {
                max_scan_seconds: 0,
                page_size: 2,
                ..options(true)
            })
            .await
            .unwrap();

        // One page processed, then the budget stopped the scan.
        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.continuation.as_deref(), Some("Patient/p1/1/aaa"));

        // Resuming from the token covers the remainder.
        let reconciler_rest = Reconciler::new(
            seeded_store().await,
            Arc::new(StubIndex::with_existing(&[("Patient", "p1", 1)])),
            "payloads",
            None,
        );
        let rest = reconciler_rest
            .run(&ReconcileOptions {
                continuation_token: summary.continuation.clone(),
                ..options(true)
            })
            .await
            .unwrap();
        assert_eq!(rest.scanned, 1);
        assert!(rest.continuation.is_none());
    }

    #[tokio::test]
    async fn test_index_failure_aborts_page() {
        let store = seeded_store().await;
        let reconciler =
            Reconciler::new(store.clone(), Arc::new(StubIndex::failing()), "payloads", None);

        let err = reconciler.run(&options(false)).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Storage(_)));

        // Nothing was deleted.
        assert_eq!(store.object_count("payloads"), 3);
    }

    #[tokio::test]
    async fn test_unparseable_keys_are_skipped() {
        let store = Arc::new(MemoryObjectStore::new());
        store
            .put_object("payloads", "not-a-blob-name", b"{}".to_vec())
            .await
            .unwrap();
        store
            .put_object("payloads", "Patient/p1/1/aaa", b"{}".to_vec())
            .await
            .unwrap();

        let reconciler = Reconciler::new(
            store,
            Arc::new(StubIndex::with_existing(&[("Patient", "p1", 1)])),
            "payloads",
            None,
        );
        let summary = reconciler.run(&options(true)).await.unwrap();
        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.orphans, 0);
    }
}

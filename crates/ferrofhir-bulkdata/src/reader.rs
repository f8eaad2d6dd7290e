//! Chunk reader: one paginated search per step, with typeFilter iteration
//! and in-memory deduplication.

use std::collections::HashSet;
use std::sync::Arc;

use ferrofhir_core::{ExportedResource, format_instant};
use ferrofhir_storage::{SearchBackend, SearchQuery};
use time::OffsetDateTime;
use tracing::info;

use crate::error::ExportError;
use crate::progress::{ExportCheckpoint, ExportProgress};

/// Whether a partition must deduplicate in memory.
///
/// More than one typeFilter can return overlapping result sets, and some
/// storage providers replay resources even under a single filter when page
/// boundaries shift beneath concurrent writes. Either condition alone
/// forces the check.
#[must_use]
pub fn dedup_required(type_filter_count: usize, provider_duplicates_possible: bool) -> bool {
    type_filter_count > 1 || provider_duplicates_possible
}

/// Per-partition page reader.
///
/// Drives the ordered typeFilter clauses for one resource type: the page
/// counter increments first on every call; exhausting the current filter's
/// pages advances to the next clause at page 1, and exhausting the last
/// clause signals end-of-data. The deduplication set spans the whole
/// partition - it is intentionally NOT reset between typeFilters, only
/// between resource types (each partition owns its own reader).
pub struct ChunkReader {
    search: Arc<dyn SearchBackend>,
    resource_type: String,
    filters: Vec<Vec<(String, String)>>,
    since: Option<OffsetDateTime>,
    till: Option<OffsetDateTime>,
    page_size: u32,
    seen: Option<HashSet<String>>,
    progress: ExportProgress,
    complete: bool,
}

impl ChunkReader {
    /// Opens a reader, restoring position from a checkpoint when resuming.
    ///
    /// `filters` is the full ordered clause list for this resource type
    /// (see [`crate::params::JobParameters::filters_for`]); it always holds
    /// at least the unconstrained clause.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn open(
        search: Arc<dyn SearchBackend>,
        resource_type: impl Into<String>,
        filters: Vec<Vec<(String, String)>>,
        since: Option<OffsetDateTime>,
        till: Option<OffsetDateTime>,
        page_size: u32,
        deduplicate: bool,
        checkpoint: Option<ExportCheckpoint>,
    ) -> Self {
        let resource_type = resource_type.into();
        let filters = if filters.is_empty() {
            vec![Vec::new()]
        } else {
            filters
        };
        let progress = match checkpoint {
            Some(checkpoint) => ExportProgress::restore(&resource_type, checkpoint),
            None => ExportProgress::new(&resource_type),
        };
        Self {
            search,
            resource_type,
            filters,
            since,
            till,
            page_size,
            seen: deduplicate.then(HashSet::new),
            progress,
            complete: false,
        }
    }

    /// Current progress, written back to the step context after every call.
    #[must_use]
    pub fn progress(&self) -> &ExportProgress {
        &self.progress
    }

    /// Mutable progress handle for the writer's upload bookkeeping.
    pub fn progress_mut(&mut self) -> &mut ExportProgress {
        &mut self.progress
    }

    /// Consumes the reader, yielding its final progress.
    #[must_use]
    pub fn into_progress(self) -> ExportProgress {
        self.progress
    }

    /// Reads the next page.
    ///
    /// Returns `Ok(None)` exactly once, when every page of every filter has
    /// been read; `more_to_export` flips to `false` at that point.
    ///
    /// # Errors
    ///
    /// Search failures propagate unchanged; the enclosing driver decides
    /// retry/stop semantics. An audit entry is recorded for every search
    /// regardless of outcome.
    pub async fn read_page(&mut self) -> Result<Option<Vec<ExportedResource>>, ExportError> {
        if self.complete {
            return Ok(None);
        }

        self.progress.page_num += 1;

        if self.progress.started() && self.progress.page_num > self.progress.last_page_num {
            let next = self.progress.type_filter_index + 1;
            if next < self.filters.len() {
                // Each filter is a distinct query with its own page space.
                self.progress.type_filter_index = next;
                self.progress.page_num = 1;
            } else {
                self.complete = true;
                self.progress.more_to_export = false;
                return Ok(None);
            }
        }

        let filter_index = self.progress.type_filter_index;
        let query = SearchQuery {
            resource_type: self.resource_type.clone(),
            filters: self.filters[filter_index].clone(),
            since: self.since,
            till: self.till,
            page: self.progress.page_num,
            page_size: self.page_size,
        };

        let result = self.search.search_page(&query).await;
        match &result {
            Ok(page) => self.audit(filter_index, page.resources.len(), "ok"),
            Err(_) => self.audit(filter_index, 0, "failed"),
        }
        let page = result?;

        let mut kept = page.resources;
        if let Some(seen) = &mut self.seen {
            kept.retain(|r| seen.insert(r.identity()));
        }

        self.progress
            .record_page(filter_index, kept.len() as u64, page.last_page);

        Ok(Some(kept))
    }

    fn audit(&self, filter_index: usize, count: usize, status: &str) {
        info!(
            target: "ferrofhir::audit",
            resource_type = %self.resource_type,
            filter_index,
            page = self.progress.page_num,
            count,
            since = self.since.map(format_instant).as_deref().unwrap_or("-"),
            till = self.till.map(format_instant).as_deref().unwrap_or("-"),
            status,
            "export search"
        );
    }
}

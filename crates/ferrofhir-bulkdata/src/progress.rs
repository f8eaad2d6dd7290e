//! Per-partition progress and its serializable checkpoint form.

use serde::{Deserialize, Serialize};

/// Working state for one partition.
///
/// One structure carries both the resumable fields and the in-memory-only
/// working state (the open multipart upload id); [`ExportProgress::snapshot`]
/// produces the serializable subset the job framework persists between
/// chunks, and [`ExportProgress::restore`] rebuilds working state from it on
/// restart. The upload id is deliberately not checkpointed: an interrupted
/// multipart upload cannot be resumed, so a restarted partition opens a
/// fresh one.
#[derive(Debug, Clone)]
pub struct ExportProgress {
    resource_type: String,
    /// Last page read (1-based); 0 before the first read.
    pub page_num: u32,
    /// Last page number of the current typeFilter's query; each filter is
    /// a distinct query, so this changes when the filter advances.
    pub last_page_num: u32,
    /// Index of the active typeFilter clause.
    pub type_filter_index: usize,
    /// Resources read per typeFilter clause.
    pub counts: Vec<u64>,
    /// Resources pushed to the object store so far.
    pub uploaded: u64,
    /// Next multipart part number.
    pub part_num: u32,
    /// Whether further pages may remain.
    pub more_to_export: bool,
    /// Open multipart upload id. In-memory only.
    pub upload_id: Option<String>,
    started: bool,
}

impl ExportProgress {
    /// Creates fresh progress for a partition that has not read yet.
    #[must_use]
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            page_num: 0,
            last_page_num: 0,
            type_filter_index: 0,
            counts: Vec::new(),
            uploaded: 0,
            part_num: 1,
            more_to_export: true,
            upload_id: None,
            started: false,
        }
    }

    /// Rebuilds progress from a persisted checkpoint.
    #[must_use]
    pub fn restore(resource_type: impl Into<String>, checkpoint: ExportCheckpoint) -> Self {
        Self {
            resource_type: resource_type.into(),
            page_num: checkpoint.page_num,
            last_page_num: checkpoint.last_page_num,
            type_filter_index: checkpoint.type_filter_index,
            counts: checkpoint.counts,
            uploaded: checkpoint.uploaded,
            part_num: checkpoint.part_num,
            more_to_export: true,
            upload_id: None,
            started: true,
        }
    }

    /// The serializable subset persisted at chunk boundaries.
    #[must_use]
    pub fn snapshot(&self) -> ExportCheckpoint {
        ExportCheckpoint {
            page_num: self.page_num,
            last_page_num: self.last_page_num,
            type_filter_index: self.type_filter_index,
            counts: self.counts.clone(),
            uploaded: self.uploaded,
            part_num: self.part_num,
        }
    }

    /// The resource type this partition owns.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Whether any page has been read yet (fresh vs. restored/active).
    #[must_use]
    pub fn started(&self) -> bool {
        self.started
    }

    /// Records one read page for the active filter.
    pub fn record_page(&mut self, filter_index: usize, resources_read: u64, last_page: u32) {
        self.started = true;
        self.type_filter_index = filter_index;
        self.last_page_num = last_page;
        while self.counts.len() <= filter_index {
            self.counts.push(0);
        }
        self.counts[filter_index] += resources_read;
    }

    /// Total resources read across every filter.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// The `Type[count1,count2,...]` summary segment, `None` when nothing
    /// was read.
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        if self.total() == 0 {
            return None;
        }
        let counts: Vec<String> = self.counts.iter().map(u64::to_string).collect();
        Some(format!("{}[{}]", self.resource_type, counts.join(",")))
    }
}

/// The serializable checkpoint persisted by the job framework between
/// chunks and across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportCheckpoint {
    pub page_num: u32,
    pub last_page_num: u32,
    pub type_filter_index: usize,
    pub counts: Vec<u64>,
    pub uploaded: u64,
    pub part_num: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut progress = ExportProgress::new("Patient");
        progress.page_num = 7;
        progress.record_page(0, 1000, 9);
        progress.record_page(1, 200, 3);
        progress.uploaded = 1100;
        progress.part_num = 4;
        progress.upload_id = Some("upload-1".to_string());

        let checkpoint = progress.snapshot();
        let restored = ExportProgress::restore("Patient", checkpoint.clone());

        assert_eq!(restored.page_num, 7);
        assert_eq!(restored.type_filter_index, 1);
        assert_eq!(restored.counts, vec![1000, 200]);
        assert_eq!(restored.uploaded, 1100);
        assert_eq!(restored.part_num, 4);
        assert!(restored.started());
        // Working state is rebuilt, not persisted.
        assert!(restored.upload_id.is_none());
        assert!(restored.more_to_export);

        // And the checkpoint itself survives serde.
        let json = serde_json::to_string(&checkpoint).unwrap();
        let back: ExportCheckpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, checkpoint);
    }

    #[test]
    fn test_summary_format() {
        let mut progress = ExportProgress::new("Patient");
        assert_eq!(progress.summary(), None);

        progress.record_page(0, 1000, 2);
        progress.record_page(0, 1000, 2);
        progress.record_page(1, 200, 1);
        assert_eq!(progress.summary().as_deref(), Some("Patient[2000,200]"));
        assert_eq!(progress.total(), 2200);
    }

    #[test]
    fn test_record_page_grows_counts() {
        let mut progress = ExportProgress::new("Observation");
        progress.record_page(2, 5, 1);
        assert_eq!(progress.counts, vec![0, 0, 5]);
        assert_eq!(progress.type_filter_index, 2);
    }
}

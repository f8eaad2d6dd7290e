//! Partition collection and job-level aggregation.

use std::time::Duration;

use tracing::info;

use crate::progress::ExportProgress;
use crate::status::JobStatus;

/// What one partition contributes to the job summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionData {
    /// The `Type[count1,count2,...]` summary segment.
    pub summary: String,
    /// Total resources this partition exported.
    pub total: u64,
}

/// Collects one partition's contribution, exactly once at clean completion.
///
/// Returns `None` - nothing to aggregate - unless the job status is exactly
/// `started`, the partition reports no more pages pending, and it produced
/// a non-empty summary. A partition that legitimately matched zero
/// resources is dropped from the summary rather than contributing a
/// zero-count segment.
#[must_use]
pub fn collect_partition_data(status: JobStatus, progress: &ExportProgress) -> Option<PartitionData> {
    if status != JobStatus::Started {
        return None;
    }
    if progress.more_to_export {
        return None;
    }
    let summary = progress.summary()?;
    Some(PartitionData {
        summary,
        total: progress.total(),
    })
}

/// Job-completion aggregation.
///
/// `elapsed` is wall-clock time summed across every execution of the same
/// job instance, so a stop/resume cycle reports the true total. Returns the
/// colon-delimited exit status, or `None` when no partition contributed
/// (job stopped before any partition finished, or nothing matched) - logged
/// as "nothing processed", not an error.
#[must_use]
pub fn after_job(elapsed: Duration, partitions: Vec<Option<PartitionData>>) -> Option<String> {
    let collected: Vec<PartitionData> = partitions.into_iter().flatten().collect();

    if collected.is_empty() {
        info!(elapsed_secs = elapsed.as_secs_f64(), "Export processed no resources");
        return None;
    }

    let total: u64 = collected.iter().map(|p| p.total).sum();
    let exit_status = collected
        .iter()
        .map(|p| p.summary.as_str())
        .collect::<Vec<_>>()
        .join(":");

    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 { total as f64 / secs } else { total as f64 };
    info!(
        total,
        elapsed_secs = secs,
        rate_per_sec = format!("{rate:.1}"),
        exit_status = %exit_status,
        "Export complete"
    );

    Some(exit_status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished_progress(resource_type: &str, counts: &[u64]) -> ExportProgress {
        let mut progress = ExportProgress::new(resource_type);
        for (i, count) in counts.iter().enumerate() {
            progress.record_page(i, *count, 1);
        }
        progress.more_to_export = false;
        progress
    }

    #[test]
    fn test_collect_requires_started_status() {
        let progress = finished_progress("Patient", &[10]);
        assert!(collect_partition_data(JobStatus::Stopped, &progress).is_none());
        assert!(collect_partition_data(JobStatus::Failed, &progress).is_none());
        assert!(collect_partition_data(JobStatus::Started, &progress).is_some());
    }

    #[test]
    fn test_collect_requires_completion() {
        let mut progress = finished_progress("Patient", &[10]);
        progress.more_to_export = true;
        assert!(collect_partition_data(JobStatus::Started, &progress).is_none());
    }

    #[test]
    fn test_collect_drops_empty_partitions() {
        let progress = finished_progress("Encounter", &[]);
        assert!(collect_partition_data(JobStatus::Started, &progress).is_none());
    }

    #[test]
    fn test_after_job_aggregation() {
        let partitions = vec![
            collect_partition_data(JobStatus::Started, &finished_progress("Patient", &[1000])),
            collect_partition_data(
                JobStatus::Started,
                &finished_progress("Observation", &[250]),
            ),
            collect_partition_data(JobStatus::Started, &finished_progress("Encounter", &[])),
        ];

        let exit_status = after_job(Duration::from_secs(10), partitions).unwrap();
        assert_eq!(exit_status, "Patient[1000]:Observation[250]");
    }

    #[test]
    fn test_after_job_multi_filter_counts() {
        let partitions = vec![collect_partition_data(
            JobStatus::Started,
            &finished_progress("Patient", &[1000, 1000, 200]),
        )];
        let exit_status = after_job(Duration::from_secs(1), partitions).unwrap();
        assert_eq!(exit_status, "Patient[1000,1000,200]");
    }

    #[test]
    fn test_after_job_nothing_processed() {
        assert!(after_job(Duration::from_secs(1), vec![None, None]).is_none());
        assert!(after_job(Duration::from_secs(1), Vec::new()).is_none());
    }
}

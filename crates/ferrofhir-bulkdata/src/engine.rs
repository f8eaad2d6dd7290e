//! The partition job driver.
//!
//! Stands in for the batch runtime at the boundary the pipeline consumes:
//! it fans partitions out onto worker tasks bounded by the plan's thread
//! width, drives each partition's read->write loop strictly sequentially,
//! snapshots checkpoints at chunk boundaries, honors stop requests between
//! chunks, and feeds the collector/listener at the end. Checkpoints are
//! held by the [`JobExecution`] so a stopped execution can be re-run and
//! resume where it left off.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ferrofhir_config::{BulkDataConfig, StorageProviderConfig};
use ferrofhir_storage::{ObjectStore, SearchBackend};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collector::{after_job, collect_partition_data};
use crate::error::ExportError;
use crate::params::JobParameters;
use crate::partition::PartitionPlan;
use crate::progress::{ExportCheckpoint, ExportProgress};
use crate::provider::provider_for;
use crate::reader::{ChunkReader, dedup_required};
use crate::status::{JobControl, JobStatus};
use crate::writer::ChunkWriter;

/// One export job: parameters plus the collaborators it runs against.
pub struct ExportJob {
    /// Parameters from the job context.
    pub params: JobParameters,
    /// Tenant bulk data configuration.
    pub bulk: BulkDataConfig,
    /// Search collaborator.
    pub search: Arc<dyn SearchBackend>,
    /// Destination object store.
    pub store: Arc<dyn ObjectStore>,
}

/// Mutable state of one job instance across executions.
///
/// Survives stop/resume: checkpoints persist between runs and elapsed time
/// accumulates so the listener reports the true wall-clock total.
pub struct JobExecution {
    /// Job instance id.
    pub job_id: Uuid,
    /// Shared status/stop handle.
    pub control: JobControl,
    checkpoints: Arc<Mutex<HashMap<String, ExportCheckpoint>>>,
    elapsed: Duration,
    /// Exit status from the most recent completed run.
    pub exit_status: Option<String>,
}

impl JobExecution {
    /// Creates a fresh job instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            job_id: Uuid::new_v4(),
            control: JobControl::new(),
            checkpoints: Arc::new(Mutex::new(HashMap::new())),
            elapsed: Duration::ZERO,
            exit_status: None,
        }
    }

    /// The persisted checkpoint for one partition, if any.
    #[must_use]
    pub fn checkpoint_for(&self, resource_type: &str) -> Option<ExportCheckpoint> {
        self.checkpoints
            .lock()
            .expect("poisoned lock")
            .get(resource_type)
            .cloned()
    }

    /// Requests a cooperative stop; partitions yield between chunks.
    pub fn request_stop(&self) {
        self.control.request_stop();
    }

    /// Accumulated wall-clock time across executions.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

impl Default for JobExecution {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs (or resumes) an export job to completion or stop.
///
/// Returns the job exit status: the colon-delimited per-type summary, or
/// `None` when nothing was processed (empty plan, or stopped before any
/// partition finished).
///
/// # Errors
///
/// Fatal configuration errors and partition failures mark the job `failed`
/// and propagate; prior checkpoints are retained, so a failed job can be
/// re-run the same way a stopped one is resumed.
pub async fn run_export(
    job: &ExportJob,
    execution: &mut JobExecution,
) -> Result<Option<String>, ExportError> {
    let provider_cfg = job.bulk.provider(&job.params.source)?.clone();
    let plan = PartitionPlan::map_partitions(&job.params.resource_types, job.bulk.max_partitions);

    let started_at = Instant::now();
    execution.control.set(JobStatus::Started);
    info!(
        job_id = %execution.job_id,
        partitions = plan.len(),
        threads = plan.threads,
        request_url = %job.params.request_url,
        "Export job started"
    );

    if plan.is_empty() {
        execution.elapsed += started_at.elapsed();
        execution.control.set(JobStatus::Completed);
        execution.exit_status = after_job(execution.elapsed, Vec::new());
        return Ok(execution.exit_status.clone());
    }

    let semaphore = Arc::new(Semaphore::new(plan.threads));
    let mut tasks: JoinSet<Result<(String, ExportProgress), ExportError>> = JoinSet::new();

    for resource_type in plan.resource_types.clone() {
        let semaphore = semaphore.clone();
        let control = execution.control.clone();
        let checkpoints = execution.checkpoints.clone();
        let search = job.search.clone();
        let store = job.store.clone();
        let params = job.params.clone();
        let bulk = job.bulk.clone();
        let provider_cfg = provider_cfg.clone();
        let job_id = execution.job_id;

        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| ExportError::partition(e.to_string()))?;
            run_partition(
                resource_type,
                control,
                checkpoints,
                search,
                store,
                &params,
                &bulk,
                &provider_cfg,
                job_id,
            )
            .await
        });
    }

    let mut results = Vec::new();
    let mut failure: Option<ExportError> = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(result)) => results.push(result),
            Ok(Err(e)) => {
                error!(error = %e, "Export partition failed");
                failure.get_or_insert(e);
            }
            Err(e) => {
                error!(error = %e, "Export partition task aborted");
                failure.get_or_insert(ExportError::partition(e.to_string()));
            }
        }
    }

    execution.elapsed += started_at.elapsed();

    if let Some(e) = failure {
        execution.control.set(JobStatus::Failed);
        return Err(e);
    }

    // Exit-status segments follow the partition plan order, not task
    // completion order.
    results.sort_by_key(|(resource_type, _)| {
        plan.resource_types
            .iter()
            .position(|t| t == resource_type)
            .unwrap_or(usize::MAX)
    });

    // Collection happens against the live status: a stop request observed
    // here drops every partition's contribution, matching a job that ended
    // before clean completion.
    let status = execution.control.status();
    let partitions = results
        .iter()
        .map(|(_, progress)| collect_partition_data(status, progress))
        .collect();

    execution.exit_status = after_job(execution.elapsed, partitions);
    let final_status = if status == JobStatus::Started {
        JobStatus::Completed
    } else {
        warn!(job_id = %execution.job_id, "Export job stopped before completion");
        JobStatus::Stopped
    };
    execution.control.set(final_status);

    Ok(execution.exit_status.clone())
}

#[allow(clippy::too_many_arguments)]
async fn run_partition(
    resource_type: String,
    control: JobControl,
    checkpoints: Arc<Mutex<HashMap<String, ExportCheckpoint>>>,
    search: Arc<dyn SearchBackend>,
    store: Arc<dyn ObjectStore>,
    params: &JobParameters,
    bulk: &BulkDataConfig,
    provider_cfg: &StorageProviderConfig,
    job_id: Uuid,
) -> Result<(String, ExportProgress), ExportError> {
    let store_checkpoint = |checkpoint: ExportCheckpoint| {
        checkpoints
            .lock()
            .expect("poisoned lock")
            .insert(resource_type.clone(), checkpoint);
    };

    let configured_filters = params
        .type_filters
        .iter()
        .filter(|f| f.resource_type == resource_type)
        .count();
    let deduplicate = dedup_required(configured_filters, provider_cfg.duplicates_possible);

    let checkpoint = checkpoints
        .lock()
        .expect("poisoned lock")
        .get(&resource_type)
        .cloned();

    let mut reader = ChunkReader::open(
        search,
        &resource_type,
        params.filters_for(&resource_type),
        params.since,
        params.till,
        bulk.page_size,
        deduplicate,
        checkpoint,
    );

    let key_prefix = if params.path_prefix.is_empty() {
        format!("{job_id}/{resource_type}")
    } else {
        format!("{}/{resource_type}", params.path_prefix)
    };
    let mut writer = ChunkWriter::new(
        control.clone(),
        store,
        provider_cfg.container.clone(),
        key_prefix,
        provider_for(params.format),
        bulk.max_objects_per_part,
        bulk.max_part_size_bytes,
    );

    // The reader's progress is the live step context: it is updated on
    // every read, found or not, and the writer mutates it in place. The
    // checkpoint map only advances at chunk commit - after an accepted
    // write - so a resumed partition re-reads anything unwritten.
    let mut committed: Option<ExportCheckpoint> = None;
    let clean = loop {
        // Stop requests are honored between chunks only.
        if control.status() == JobStatus::Stopping {
            info!(resource_type = %resource_type, "Partition yielding to stop request");
            break false;
        }

        match reader.read_page().await? {
            Some(items) => {
                let wrote = writer.write_items(&items, reader.progress_mut()).await?;
                if !wrote {
                    break false;
                }
                let snapshot = reader.progress().snapshot();
                store_checkpoint(snapshot.clone());
                committed = Some(snapshot);
            }
            None => break true,
        }
    };

    writer.finalize(reader.progress_mut()).await?;
    if clean {
        store_checkpoint(reader.progress().snapshot());
    } else if let Some(mut checkpoint) = committed {
        // Parts flushed by finalize are durable, so carry the upload
        // counters forward; counts stay at the last committed chunk.
        checkpoint.part_num = reader.progress().part_num;
        checkpoint.uploaded = reader.progress().uploaded;
        store_checkpoint(checkpoint);
    }

    Ok((resource_type, reader.into_progress()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_execution_has_no_checkpoints() {
        let execution = JobExecution::new();
        assert!(execution.checkpoint_for("Patient").is_none());
        assert_eq!(execution.elapsed(), Duration::ZERO);
        assert_eq!(execution.control.status(), JobStatus::Starting);
    }
}

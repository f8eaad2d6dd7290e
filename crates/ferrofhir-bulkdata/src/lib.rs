//! Partitioned bulk export pipeline.
//!
//! One export job fans out into one partition per requested resource type,
//! bounded by the configured maximum concurrency. Within a partition the
//! chunk loop is strictly sequential: the [`reader::ChunkReader`] issues one
//! paginated search per step, the [`writer::ChunkWriter`] pushes the page
//! into the destination object store, and the driver snapshots an
//! [`progress::ExportCheckpoint`] at every chunk boundary so a stopped job
//! resumes where it left off. The [`collector`] gathers per-partition
//! summaries exactly once at clean completion and the job listener folds
//! them into the colon-delimited exit status.

pub mod collector;
pub mod engine;
pub mod error;
pub mod params;
pub mod partition;
pub mod progress;
pub mod provider;
pub mod reader;
pub mod status;
pub mod writer;

pub use collector::{PartitionData, after_job, collect_partition_data};
pub use engine::{ExportJob, JobExecution, run_export};
pub use error::ExportError;
pub use params::{ExportFormat, JobParameters, TypeFilter};
pub use partition::PartitionPlan;
pub use progress::{ExportCheckpoint, ExportProgress};
pub use provider::{ExportProvider, NdjsonProvider, ParquetProvider, provider_for};
pub use reader::{ChunkReader, dedup_required};
pub use status::{JobControl, JobStatus};
pub use writer::ChunkWriter;

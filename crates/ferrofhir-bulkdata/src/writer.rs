//! Chunk writer: pushes read pages into the destination object store.

use std::sync::Arc;

use ferrofhir_core::ExportedResource;
use ferrofhir_storage::ObjectStore;
use tracing::{debug, info};

use crate::error::ExportError;
use crate::progress::ExportProgress;
use crate::provider::ExportProvider;
use crate::status::{JobControl, JobStatus};

/// Per-partition sink.
///
/// Accumulates pages in the format provider and commits object-store parts
/// when the configured thresholds trip. For multipart-capable formats the
/// partition produces one object per execution segment, assembled from
/// sequentially uploaded parts; formats without multipart support produce
/// one standalone object per part. All upload bookkeeping (part number,
/// uploaded count, open upload id) lives in the shared [`ExportProgress`]
/// so the reader and the checkpoint observe consistent state.
pub struct ChunkWriter {
    control: JobControl,
    store: Arc<dyn ObjectStore>,
    container: String,
    key_prefix: String,
    provider: Box<dyn ExportProvider>,
    max_objects_per_part: u64,
    max_part_size_bytes: usize,
    container_created: bool,
    multipart_key: Option<String>,
}

impl ChunkWriter {
    /// Creates a writer for one partition.
    ///
    /// `key_prefix` already includes the job path prefix and the resource
    /// type (e.g. `job42/Patient`).
    #[must_use]
    pub fn new(
        control: JobControl,
        store: Arc<dyn ObjectStore>,
        container: impl Into<String>,
        key_prefix: impl Into<String>,
        provider: Box<dyn ExportProvider>,
        max_objects_per_part: u64,
        max_part_size_bytes: usize,
    ) -> Self {
        Self {
            control,
            store,
            container: container.into(),
            key_prefix: key_prefix.into(),
            provider,
            max_objects_per_part,
            max_part_size_bytes,
            container_created: false,
            multipart_key: None,
        }
    }

    /// Writes one read page.
    ///
    /// Short-circuits to a no-op - returning `Ok(false)` - unless the job
    /// is in the `started` state: the cooperative cancellation check. The
    /// destination container is created lazily on the first effective
    /// write. `Ok(true)` means the page is accepted and this chunk may be
    /// checkpointed.
    ///
    /// # Errors
    ///
    /// Object-store failures propagate to the driver, which fails the
    /// partition.
    pub async fn write_items(
        &mut self,
        items: &[ExportedResource],
        progress: &mut ExportProgress,
    ) -> Result<bool, ExportError> {
        if self.control.status() != JobStatus::Started {
            debug!(
                status = %self.control.status(),
                "Job is not started; skipping write"
            );
            return Ok(false);
        }

        if !self.container_created {
            self.store.ensure_container(&self.container).await?;
            self.container_created = true;
        }

        self.provider.encode(items)?;

        if self.provider.buffered_count() >= self.max_objects_per_part
            || self.provider.buffered_bytes() >= self.max_part_size_bytes
        {
            self.flush_part(progress).await?;
        }

        Ok(true)
    }

    /// Flushes any buffered data and completes the open upload.
    ///
    /// Called once per execution segment, after the reader signals
    /// end-of-data or the job is asked to stop.
    ///
    /// # Errors
    ///
    /// Object-store failures propagate to the driver.
    pub async fn finalize(&mut self, progress: &mut ExportProgress) -> Result<(), ExportError> {
        if self.provider.buffered_count() > 0 {
            if !self.container_created {
                self.store.ensure_container(&self.container).await?;
                self.container_created = true;
            }
            self.flush_part(progress).await?;
        }

        if let Some(upload_id) = progress.upload_id.take() {
            self.store.complete_multipart(&upload_id).await?;
            info!(
                key = self.multipart_key.as_deref().unwrap_or(&self.key_prefix),
                uploaded = progress.uploaded,
                "Completed export upload"
            );
        }
        Ok(())
    }

    async fn flush_part(&mut self, progress: &mut ExportProgress) -> Result<(), ExportError> {
        let count = self.provider.buffered_count();
        if count == 0 {
            return Ok(());
        }
        let bytes = self.provider.take_part()?;
        let size = bytes.len();

        if self.provider.supports_multipart() {
            if progress.upload_id.is_none() {
                // A resumed partition opens a fresh object: an interrupted
                // multipart upload cannot be resumed, so the key carries the
                // first part number of this segment.
                let key = format!(
                    "{}_{}.{}",
                    self.key_prefix,
                    progress.part_num,
                    self.provider.format().extension()
                );
                let upload_id = self.store.begin_multipart(&self.container, &key).await?;
                self.multipart_key = Some(key);
                progress.upload_id = Some(upload_id);
            }
            // Just set above when absent.
            let upload_id = progress.upload_id.clone().unwrap_or_default();
            self.store
                .upload_part(&upload_id, progress.part_num, bytes)
                .await?;
        } else {
            let key = format!(
                "{}_{}.{}",
                self.key_prefix,
                progress.part_num,
                self.provider.format().extension()
            );
            self.store.put_object(&self.container, &key, bytes).await?;
        }

        progress.part_num += 1;
        progress.uploaded += count;

        debug!(
            key_prefix = %self.key_prefix,
            part = progress.part_num - 1,
            resources = count,
            bytes = size,
            "Committed export part"
        );
        Ok(())
    }
}

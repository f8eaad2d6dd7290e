//! Directory-backed object store.
//!
//! One object per file under `<root>/<container>/<key>`. Multipart uploads
//! accumulate in a hidden staging file and become visible atomically on
//! completion via rename.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::StorageError;
use crate::traits::{ObjectStore, ScanPage};

#[derive(Debug, Clone)]
struct PendingUpload {
    staging: PathBuf,
    target: PathBuf,
}

/// An object store rooted at a local directory.
#[derive(Debug)]
pub struct FileObjectStore {
    root: PathBuf,
    uploads: Mutex<HashMap<String, PendingUpload>>,
}

impl FileObjectStore {
    /// Creates a store rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            uploads: Mutex::new(HashMap::new()),
        }
    }

    fn object_path(&self, container: &str, key: &str) -> Result<PathBuf, StorageError> {
        if key.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
            return Err(StorageError::invalid_blob_name(key, "unsafe path segment"));
        }
        Ok(self.root.join(container).join(key))
    }

    fn take_upload(&self, upload_id: &str) -> Result<PendingUpload, StorageError> {
        self.uploads
            .lock()
            .expect("poisoned lock")
            .remove(upload_id)
            .ok_or_else(|| StorageError::unknown_upload(upload_id))
    }

    fn peek_upload(&self, upload_id: &str) -> Result<PendingUpload, StorageError> {
        self.uploads
            .lock()
            .expect("poisoned lock")
            .get(upload_id)
            .cloned()
            .ok_or_else(|| StorageError::unknown_upload(upload_id))
    }

    /// Collects every key under a container directory, sorted.
    fn walk_keys(container_dir: &Path) -> Result<Vec<String>, StorageError> {
        fn visit(dir: &Path, base: &Path, keys: &mut Vec<String>) -> std::io::Result<()> {
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                let path = entry.path();
                if entry.file_type()?.is_dir() {
                    visit(&path, base, keys)?;
                } else if let Ok(rel) = path.strip_prefix(base) {
                    let key = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    // Staging files are invisible to scans.
                    if !key.rsplit('/').next().is_some_and(|n| n.starts_with('.')) {
                        keys.push(key);
                    }
                }
            }
            Ok(())
        }

        let mut keys = Vec::new();
        if container_dir.is_dir() {
            visit(container_dir, container_dir, &mut keys)?;
        }
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    async fn ensure_container(&self, container: &str) -> Result<(), StorageError> {
        fs::create_dir_all(self.root.join(container)).await?;
        Ok(())
    }

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<(), StorageError> {
        let path = self.object_path(container, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn get_object(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.object_path(container, key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_object(&self, container: &str, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(container, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn begin_multipart(&self, container: &str, key: &str) -> Result<String, StorageError> {
        let target = self.object_path(container, key)?;
        let upload_id = Uuid::new_v4().to_string();
        let staging = match target.parent() {
            Some(parent) => {
                fs::create_dir_all(parent).await?;
                parent.join(format!(".upload-{upload_id}"))
            }
            None => return Err(StorageError::invalid_blob_name(key, "no parent directory")),
        };
        // Touch the staging file so zero-part uploads still complete.
        fs::write(&staging, b"").await?;

        self.uploads
            .lock()
            .expect("poisoned lock")
            .insert(upload_id.clone(), PendingUpload { staging, target });
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        upload_id: &str,
        _part_number: u32,
        bytes: Vec<u8>,
    ) -> Result<(), StorageError> {
        let upload = self.peek_upload(upload_id)?;
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&upload.staging)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }

    async fn complete_multipart(&self, upload_id: &str) -> Result<(), StorageError> {
        let upload = self.take_upload(upload_id)?;
        fs::rename(&upload.staging, &upload.target).await?;
        Ok(())
    }

    async fn abort_multipart(&self, upload_id: &str) -> Result<(), StorageError> {
        let upload = self.take_upload(upload_id)?;
        match fs::remove_file(&upload.staging).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn scan_page(
        &self,
        container: &str,
        continuation: Option<&str>,
        page_size: usize,
    ) -> Result<ScanPage, StorageError> {
        let container_dir = self.root.join(container);
        let all = Self::walk_keys(&container_dir)?;

        let keys: Vec<String> = all
            .into_iter()
            .filter(|k| continuation.is_none_or(|after| k.as_str() > after))
            .take(page_size)
            .collect();

        let continuation = if keys.len() == page_size {
            keys.last().cloned()
        } else {
            None
        };

        Ok(ScanPage { keys, continuation })
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

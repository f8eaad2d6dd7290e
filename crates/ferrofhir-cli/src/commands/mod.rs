pub mod export;
pub mod reconcile;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use ferrofhir_config::{ProviderKind, StorageProviderConfig};
use ferrofhir_storage::{FileObjectStore, MemoryObjectStore, ObjectStore};

/// Builds the object store for a configured provider.
pub fn object_store_for(config: &StorageProviderConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.kind {
        ProviderKind::Memory => Ok(Arc::new(MemoryObjectStore::new())),
        ProviderKind::File => {
            let Some(root) = &config.root else {
                bail!("file storage provider requires a 'root' directory");
            };
            std::fs::create_dir_all(root)
                .with_context(|| format!("creating provider root '{root}'"))?;
            Ok(Arc::new(FileObjectStore::new(root)))
        }
    }
}

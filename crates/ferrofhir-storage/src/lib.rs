//! Storage abstraction layer for the FerroFHIR bulk data server.
//!
//! This crate defines the seams between the pipeline crates and the
//! infrastructure they drive:
//!
//! - [`ObjectStore`] - the offloaded-payload / export-destination object
//!   store (file and in-memory implementations included);
//! - [`SearchBackend`] - one paginated export search per call, executed in
//!   its own transaction by the implementation;
//! - [`ResourceIndex`] - the relational existence check used by payload
//!   reconciliation;
//! - [`BlobName`] - the structured decomposition of an offloaded-payload
//!   storage key.

pub mod blob_name;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use blob_name::{BlobName, BlobNameBuilder, TypeMaps, TypeRef};
pub use error::StorageError;
pub use file::FileObjectStore;
pub use memory::{MemoryObjectStore, MemorySearchBackend};
pub use traits::{ObjectStore, ResourceIndex, ScanPage, SearchBackend, SearchPage, SearchQuery};

//! Core types and utilities shared across the FerroFHIR bulk data crates.
//!
//! This crate carries the small set of types that every other crate in the
//! workspace agrees on: tenant/datastore identity, the resource shape that
//! flows through the export pipeline, the shared error taxonomy, and
//! RFC3339 instant handling.

pub mod error;
pub mod resource;
pub mod tenant;
pub mod time;

pub use error::{CoreError, Result};
pub use resource::ExportedResource;
pub use tenant::TenantDatasourceKey;
pub use time::{format_instant, parse_instant};

//! PostgreSQL persistence backend for the FerroFHIR bulk data server.
//!
//! Covers the relational slice the pipeline depends on:
//!
//! - connection pool creation ([`pool`]),
//! - flavor-dispatched SQL dialects for reference normalization
//!   ([`dialect`]),
//! - the reference DAO resolving/creating normalized ids through the tenant
//!   cache ([`dao`]),
//! - the existence check behind payload reconciliation ([`index`]),
//! - the paginated export search ([`search`]).

pub mod dao;
pub mod dialect;
pub mod error;
pub mod index;
pub mod pool;
pub mod schema;
pub mod search;

pub use dao::{ReferenceDao, TokenValueRec};
pub use dialect::{CitusDialect, PostgresDialect, ReferenceDialect, dialect_for};
pub use error::{PostgresError, Result};
pub use index::PostgresResourceIndex;
pub use pool::create_pool;
pub use search::PostgresSearchBackend;

//! SQLite storage for the macrodash persistent cache.
//!
//! This crate is the only place in the workspace where Diesel dependencies
//! exist. It implements the [`CacheStore`](macrodash_core::cache::CacheStore)
//! trait defined in `macrodash-core` on top of a pooled SQLite database:
//! - Connection pooling and PRAGMA setup
//! - Embedded Diesel migrations
//! - The `cache_entries` key/value table

pub mod cache;
pub mod db;
pub mod errors;
pub mod schema;

pub use cache::SqliteCacheStore;
pub use db::{create_pool, get_connection, init, run_migrations, DbConnection, DbPool};
pub use errors::{IntoCore, StorageError};

// Re-export from macrodash-core for convenience
pub use macrodash_core::errors::{DatabaseError, Error, Result};

//! Core error types for the dashboard.
//!
//! Storage-specific errors (SQLite, filesystem) are converted to these types
//! by the storage layer. Provider failures stay [`MarketDataError`] and are
//! only surfaced here when they are configuration defects.

use thiserror::Error;

pub use macrodash_market_data::MarketDataError;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the dashboard core.
///
/// Per-symbol provider failures never appear here; they are absorbed by the
/// services. What remains are setup defects and persistence failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Market data operation failed: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Unknown tab: {0}")]
    UnknownTab(String),

    #[error("Unknown symbol {symbol} in tab {tab}")]
    UnknownSymbol { tab: String, symbol: String },

    #[error("Invalid configuration value: {0}")]
    InvalidConfigValue(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Setup defects that must reach the caller instead of being absorbed.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::MarketData(e) => e.kind().is_fatal(),
            Self::UnknownTab(_) | Self::UnknownSymbol { .. } | Self::InvalidConfigValue(_) => true,
            _ => false,
        }
    }
}

/// Database-agnostic error type for cache store operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open the backing database.
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// A query failed to execute.
    #[error("Database query failed: {0}")]
    QueryFailed(String),

    /// Schema setup failed.
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Internal/unexpected database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}

//! Quote cache management.
//!
//! - [`model`] - Cached quote records, sparkline rules and tile snapshots
//! - [`service`] - Cache-first quote reads and coalesced refreshes
//!
//! ```text
//! QuoteService → SymbolResolver → MarketDataProvider
//!      ↓               ↓
//! TieredCache    BaselineService (1W/1M change)
//! ```

pub mod model;
pub mod service;

#[cfg(test)]
mod service_tests;

pub use model::{QuoteRecord, QuoteSnapshot, SparkPoint};
pub use service::QuoteService;

//! Macrodash Core - caching, staleness and refresh orchestration.
//!
//! This crate keeps a macro market dashboard's tiles fed from a persistent
//! cache while a small number of rate-limited upstream providers are polled
//! in the background. It is storage-agnostic: the [`cache::CacheStore`]
//! trait is implemented by the `storage-sqlite` crate.

pub mod baselines;
pub mod cache;
pub mod calendar;
pub mod candles;
pub mod config;
pub mod constants;
pub mod dashboard;
pub mod errors;
pub mod events;
pub mod intraday;
pub mod quotes;
pub mod symbols;
pub mod tabs;
pub mod timeframe;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{DashboardConfig, TabConfig, TabKind};
pub use dashboard::{Dashboard, DashboardProviders, DashboardStatus, TabTiles, TileView};
pub use timeframe::Timeframe;

// Re-export error types
pub use errors::Error;
pub use errors::Result;

//! Candle cache management.
//!
//! Two base tiers are fetched from providers (1-minute over a week, 1-hour
//! over 45 days). The 1D, 1W and 1M views are derived from them locally and
//! never fetched directly.

pub mod derive;
pub mod model;
pub mod service;


pub use model::{CandleSeries, CandleSnapshot, CandleTier};
pub use service::CandleService;

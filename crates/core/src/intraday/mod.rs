//! Intraday charts for the expanded tile view.
//!
//! Unlike the candle tiers these are fetched per range from the time-series
//! provider and cached as-is after session filtering.

mod service;


pub use service::{IntradaySeries, IntradayService};

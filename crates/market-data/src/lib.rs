//! Macro Dashboard Market Data Crate
//!
//! Thin, provider-agnostic clients for the upstream quote, candle, pair
//! discovery and economic calendar APIs used by the dashboard.
//!
//! # Overview
//!
//! - [`MarketDataProvider`] is the seam the caching layer depends on.
//! - [`FinnhubProvider`] covers quotes, candles, pair discovery and the calendar.
//! - [`TwelveDataProvider`] is the secondary time-series source.
//! - Every failure is a [`MarketDataError`] classified into an [`ErrorKind`].
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +------------------+
//! |  Caching layer   | --> |  InstrumentSpec  |  (static tab configuration)
//! +------------------+     +------------------+
//!                                  |
//!                                  v  (symbol resolution, in core)
//!                          +------------------+
//!                          |    Provider      |  (Finnhub, Twelve Data)
//!                          +------------------+
//!                                  |
//!                                  v
//!                 +----------------------------------+
//!                 | ProviderQuote | SeriesResponse   |  (normalized payloads)
//!                 +----------------------------------+
//! ```

pub mod errors;
pub mod models;
pub mod provider;

// Re-export all public types from models
pub use models::{
    Bar, CandleRequest, EconomicEvent, InstrumentKind, InstrumentSpec,
    ProviderQuote, ProviderSymbol, RequestContext, Resolution, SeriesResponse, SyntheticPair,
};

// Re-export provider types
pub use provider::finnhub::FinnhubProvider;
pub use provider::twelve_data::TwelveDataProvider;
pub use provider::{ApiKeyring, MarketDataProvider, ProviderCapabilities};

// Re-export error types
pub use errors::{ErrorKind, MarketDataError};

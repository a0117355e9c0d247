//! Market data models
//!
//! This module contains the core data types shared by providers and the caching layer:
//! - `types` - Type aliases for provider identifiers
//! - `instrument` - Instrument specs as declared in tab configuration
//! - `quote` - Normalized last-quote payload (ProviderQuote)
//! - `bar` - OHLC bars, candle requests and the normalized series response
//! - `pair` - Synthetic pair discovery rows
//! - `calendar` - Economic calendar rows
//! - `context` - Per-request context (key scope + cancellation)

mod bar;
mod calendar;
mod context;
mod instrument;
mod pair;
mod quote;
mod types;

pub use bar::{Bar, CandleRequest, Resolution, SeriesResponse};
pub use calendar::EconomicEvent;
pub use context::RequestContext;
pub use instrument::{InstrumentKind, InstrumentSpec};
pub use pair::SyntheticPair;
pub use quote::ProviderQuote;
pub use types::ProviderSymbol;

//! Market data provider abstractions and implementations.
//!
//! This module contains:
//! - The `MarketDataProvider` trait that all providers implement
//! - Provider capabilities and request pacing configuration
//! - Scoped credentials (`ApiKeyring`)
//! - Concrete provider implementations (Finnhub, Twelve Data)
//!
//! Providers receive pre-resolved, provider-native symbols. Mapping a
//! synthetic pair to its native identifier happens in the caching layer.

mod capabilities;
mod keyring;
mod status;
mod traits;

pub mod finnhub;
pub mod twelve_data;

// Re-exports
pub use capabilities::ProviderCapabilities;
pub use keyring::ApiKeyring;
pub use traits::MarketDataProvider;

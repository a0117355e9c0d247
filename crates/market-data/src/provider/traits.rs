//! Market data provider trait definitions.
//!
//! This module defines the core `MarketDataProvider` trait that all
//! market data providers implement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::MarketDataError;
use crate::models::{
    Bar, CandleRequest, EconomicEvent, InstrumentKind, ProviderQuote, RequestContext, Resolution,
    SeriesResponse, SyntheticPair,
};

use super::capabilities::ProviderCapabilities;

/// Trait for market data providers.
///
/// Providers receive already-resolved provider-native symbols. Resolution of
/// synthetic pairs and fallback tickers happens in the caching layer.
///
/// Every method takes a [`RequestContext`] carrying the credential scope and a
/// cancellation token. Implementations must return
/// [`MarketDataError::Cancelled`] once the token fires.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use macrodash_market_data::provider::{MarketDataProvider, ProviderCapabilities};
///
/// struct MyProvider;
///
/// #[async_trait]
/// impl MarketDataProvider for MyProvider {
///     fn id(&self) -> &'static str {
///         "MY_PROVIDER"
///     }
///
///     fn capabilities(&self) -> ProviderCapabilities {
///         ProviderCapabilities {
///             supports_quotes: true,
///             ..Default::default()
///         }
///     }
///
///     // ... implement get_quote
/// }
/// ```
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Unique identifier for this provider ("FINNHUB", "TWELVE_DATA").
    ///
    /// Used for logging and as the `source` of produced quotes.
    fn id(&self) -> &'static str;

    /// Describes what this provider can do.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Fails with [`MarketDataError::MissingApiKey`] when no credential is
    /// configured for `scope`.
    ///
    /// Callers check this before issuing any request so that a configuration
    /// problem is never mistaken for a per-symbol failure.
    fn ensure_credentials(&self, scope: &str) -> Result<(), MarketDataError> {
        let _ = scope;
        Ok(())
    }

    /// Fetch the latest quote for a provider-native symbol.
    async fn get_quote(
        &self,
        ctx: &RequestContext,
        symbol: &str,
        kind: InstrumentKind,
    ) -> Result<ProviderQuote, MarketDataError> {
        let _ = (ctx, symbol, kind);
        Err(self.not_supported("quote"))
    }

    /// Fetch OHLC bars for a window.
    ///
    /// Returns [`SeriesResponse::NoData`] when the provider answered but has
    /// nothing for the window; that is not an error.
    async fn get_candles(
        &self,
        ctx: &RequestContext,
        request: &CandleRequest,
    ) -> Result<SeriesResponse, MarketDataError> {
        let _ = (ctx, request);
        Err(self.not_supported("candles"))
    }

    /// Fetch daily bars between `from` and `to`.
    ///
    /// The default implementation issues a daily-resolution candle request.
    async fn get_daily_series(
        &self,
        ctx: &RequestContext,
        symbol: &str,
        kind: InstrumentKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, MarketDataError> {
        let request = CandleRequest::new(
            symbol,
            kind,
            Resolution::Daily,
            from.timestamp(),
            to.timestamp(),
        );
        Ok(self.get_candles(ctx, &request).await?.into_bars())
    }

    /// List the provider's synthetic FX/metal pairs.
    async fn discover_synthetic_pairs(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<SyntheticPair>, MarketDataError> {
        let _ = ctx;
        Err(self.not_supported("pair discovery"))
    }

    /// Fetch economic calendar releases between two dates (`YYYY-MM-DD`).
    async fn get_economic_calendar(
        &self,
        ctx: &RequestContext,
        from: &str,
        to: &str,
    ) -> Result<Vec<EconomicEvent>, MarketDataError> {
        let _ = (ctx, from, to);
        Err(self.not_supported("economic calendar"))
    }

    #[doc(hidden)]
    fn not_supported(&self, operation: &str) -> MarketDataError {
        MarketDataError::NotSupported {
            operation: operation.to_string(),
            provider: self.id().to_string(),
        }
    }
}

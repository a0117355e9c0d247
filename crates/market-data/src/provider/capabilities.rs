//! Provider capabilities.

/// Describes which operations a market data provider implements.
///
/// The caching layer checks these flags when wiring providers: a secondary
/// without candles is ignored, and a provider without pair discovery leaves
/// synthetic pairs unresolved.
#[derive(Clone, Debug, Default)]
pub struct ProviderCapabilities {
    /// Last-price quotes (`get_quote`).
    pub supports_quotes: bool,

    /// Intraday/daily OHLC candles (`get_candles`).
    pub supports_candles: bool,

    /// Listing of synthetic FX/metal pairs (`discover_synthetic_pairs`).
    pub supports_pair_discovery: bool,

    /// Economic calendar releases (`get_economic_calendar`).
    pub supports_calendar: bool,

    /// Candle requests can be restricted to the current session day.
    pub supports_today_only: bool,
}

//! Finnhub market data provider implementation.
//!
//! This module provides market data from the Finnhub API:
//! - Equities/ETFs via /quote and /stock/candle endpoints
//! - Synthetic FX/metal pairs via /forex/candle and /forex/symbol
//! - Economic releases via /calendar/economic
//!
//! Finnhub free tier is limited to 60 API calls per minute per key.
//! API documentation: https://finnhub.io/docs/api

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::errors::MarketDataError;
use crate::models::{
    Bar, CandleRequest, EconomicEvent, InstrumentKind, ProviderQuote, RequestContext,
    SeriesResponse, SyntheticPair,
};
use crate::provider::status::error_for_status;
use crate::provider::{ApiKeyring, MarketDataProvider, ProviderCapabilities};

const BASE_URL: &str = "https://finnhub.io/api/v1";
const PROVIDER_ID: &str = "FINNHUB";

/// Exchange listed by /forex/symbol for metal and currency pairs.
const PAIR_EXCHANGE: &str = "OANDA";

// ============================================================================
// API Response Structures
// ============================================================================

/// Response from /quote endpoint
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price
    c: Option<f64>,
    /// Change
    d: Option<f64>,
    /// Percent change
    dp: Option<f64>,
    /// High price of the day
    h: Option<f64>,
    /// Low price of the day
    l: Option<f64>,
    /// Open price of the day
    o: Option<f64>,
    /// Previous close
    pc: Option<f64>,
    /// Timestamp (Unix)
    t: Option<i64>,
}

/// Response from /stock/candle and /forex/candle endpoints
#[derive(Debug, Deserialize)]
struct CandleResponse {
    /// Status: "ok" or "no_data"
    s: String,
    #[serde(default)]
    c: Vec<f64>,
    #[serde(default)]
    h: Vec<f64>,
    #[serde(default)]
    l: Vec<f64>,
    #[serde(default)]
    o: Vec<f64>,
    #[serde(default)]
    v: Vec<f64>,
    #[serde(default)]
    t: Vec<i64>,
}

/// One row of /forex/symbol
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForexSymbolItem {
    #[serde(default)]
    description: Option<String>,
    display_symbol: String,
    symbol: String,
}

/// Response from /calendar/economic
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarResponse {
    #[serde(default)]
    economic_calendar: Vec<CalendarItem>,
}

#[derive(Debug, Deserialize)]
struct CalendarItem {
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default, deserialize_with = "impact_label")]
    impact: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    actual: Option<f64>,
    #[serde(default)]
    estimate: Option<f64>,
    #[serde(default)]
    prev: Option<f64>,
    #[serde(default)]
    unit: Option<String>,
}

/// Error response from Finnhub
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

/// Finnhub sends impact as "low"/"medium"/"high", occasionally as a number.
fn impact_label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
            Some(s.trim().to_lowercase())
        }
        Some(serde_json::Value::Number(n)) => match n.as_i64() {
            Some(3..) => Some("high".to_string()),
            Some(2) => Some("medium".to_string()),
            Some(1) => Some("low".to_string()),
            _ => None,
        },
        _ => None,
    })
}

// ============================================================================
// FinnhubProvider
// ============================================================================

/// Finnhub market data provider.
///
/// Tokens are looked up per request from the keyring using the request's
/// scope, so each tab draws from its own quota.
pub struct FinnhubProvider {
    client: Client,
    keyring: ApiKeyring,
    base_url: String,
}

impl FinnhubProvider {
    /// Create a new Finnhub provider with the given credentials.
    pub fn new(keyring: ApiKeyring) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            keyring,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the provider at a different host (used for proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Make a GET request to the Finnhub API, aborting when the context is cancelled.
    async fn fetch(
        &self,
        ctx: &RequestContext,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, MarketDataError> {
        let token = self.keyring.require(PROVIDER_ID, &ctx.scope)?;
        if ctx.is_cancelled() {
            return Err(MarketDataError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                debug!("Finnhub request cancelled: {}", endpoint);
                Err(MarketDataError::Cancelled)
            }
            result = self.send(endpoint, params, &token) => result,
        }
    }

    async fn send(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        token: &str,
    ) -> Result<String, MarketDataError> {
        let url = format!("{}{}", self.base_url, endpoint);

        // Token goes in a header so it never appears in logged URLs
        let request = self
            .client
            .get(&url)
            .header("X-Finnhub-Token", token)
            .query(params);

        debug!("Finnhub request: {} with {} params", endpoint, params.len());

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                MarketDataError::Timeout {
                    provider: PROVIDER_ID.to_string(),
                }
            } else {
                MarketDataError::provider(PROVIDER_ID, format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            MarketDataError::provider(PROVIDER_ID, format!("Failed to read response: {}", e))
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| {
                    format!(
                        "Finnhub HTTP {} {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or_default()
                    )
                });
            let error = error_for_status(PROVIDER_ID, status.as_u16(), message);
            if error.is_access_restricted() {
                warn!("Finnhub refused {}: {}", endpoint, error);
            }
            return Err(error);
        }

        Ok(body)
    }
}

// ============================================================================
// Parsing
// ============================================================================

fn parse_quote(text: &str, symbol: &str) -> Result<ProviderQuote, MarketDataError> {
    let response: QuoteResponse = serde_json::from_str(text).map_err(|e| {
        MarketDataError::provider(PROVIDER_ID, format!("Failed to parse quote response: {}", e))
    })?;

    let price = response.c.ok_or_else(|| {
        MarketDataError::SymbolNotFound(format!("No quote data for symbol: {}", symbol))
    })?;

    // Finnhub answers unknown symbols with an all-zero quote instead of an error
    if !price.is_finite() || price == 0.0 {
        return Err(MarketDataError::InvalidData {
            provider: PROVIDER_ID.to_string(),
            message: format!("Placeholder quote for {}", symbol),
        });
    }

    Ok(ProviderQuote {
        price,
        change: response.d,
        percent_change: response.dp.filter(|v| v.is_finite()),
        open: response.o,
        high: response.h,
        low: response.l,
        previous_close: response.pc.filter(|v| v.is_finite() && *v != 0.0),
        timestamp: response.t.filter(|t| *t > 0),
        source: PROVIDER_ID.to_string(),
    })
}

fn parse_candles(text: &str, symbol: &str) -> Result<SeriesResponse, MarketDataError> {
    let response: CandleResponse = serde_json::from_str(text).map_err(|e| {
        MarketDataError::provider(PROVIDER_ID, format!("Failed to parse candle response: {}", e))
    })?;

    if response.s == "no_data" {
        return Ok(SeriesResponse::NoData);
    }

    if response.s != "ok" {
        return Err(MarketDataError::provider(
            PROVIDER_ID,
            format!("Unexpected candle status: {}", response.s),
        ));
    }

    let len = response.t.len();
    if response.c.len() != len
        || response.o.len() != len
        || response.h.len() != len
        || response.l.len() != len
    {
        return Err(MarketDataError::provider(
            PROVIDER_ID,
            "Mismatched array lengths in candle response",
        ));
    }

    let mut bars = Vec::with_capacity(len);
    for i in 0..len {
        let bar = Bar {
            timestamp: response.t[i],
            open: response.o[i],
            high: response.h[i],
            low: response.l[i],
            close: response.c[i],
            volume: response.v.get(i).copied().filter(|v| v.is_finite()),
        };
        if !bar.is_finite() {
            warn!("Skipping non-finite candle at index {} for {}", i, symbol);
            continue;
        }
        bars.push(bar);
    }

    debug!("Finnhub: parsed {} candles for {}", bars.len(), symbol);
    Ok(SeriesResponse::from_bars(bars))
}

fn parse_forex_symbols(text: &str) -> Result<Vec<SyntheticPair>, MarketDataError> {
    let items: Vec<ForexSymbolItem> = serde_json::from_str(text).map_err(|e| {
        MarketDataError::provider(PROVIDER_ID, format!("Failed to parse forex symbols: {}", e))
    })?;

    Ok(items
        .into_iter()
        .filter(|item| !item.symbol.is_empty() && !item.display_symbol.is_empty())
        .map(|item| SyntheticPair {
            display_code: item.display_symbol,
            native_id: item.symbol,
            description: item.description,
        })
        .collect())
}

fn parse_calendar(text: &str) -> Result<Vec<EconomicEvent>, MarketDataError> {
    let response: CalendarResponse = serde_json::from_str(text).map_err(|e| {
        MarketDataError::provider(PROVIDER_ID, format!("Failed to parse calendar: {}", e))
    })?;

    Ok(response
        .economic_calendar
        .into_iter()
        .map(|item| EconomicEvent {
            country: item.country.unwrap_or_default(),
            event: item.event.unwrap_or_default(),
            impact: item.impact,
            time: item.time,
            actual: item.actual,
            estimate: item.estimate,
            prev: item.prev,
            unit: item.unit,
        })
        .collect())
}

// ============================================================================
// MarketDataProvider Implementation
// ============================================================================

#[async_trait]
impl MarketDataProvider for FinnhubProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_quotes: true,
            supports_candles: true,
            supports_pair_discovery: true,
            supports_calendar: true,
            supports_today_only: false,
        }
    }

    fn ensure_credentials(&self, scope: &str) -> Result<(), MarketDataError> {
        self.keyring.require(PROVIDER_ID, scope).map(|_| ())
    }

    async fn get_quote(
        &self,
        ctx: &RequestContext,
        symbol: &str,
        _kind: InstrumentKind,
    ) -> Result<ProviderQuote, MarketDataError> {
        let text = self.fetch(ctx, "/quote", &[("symbol", symbol)]).await?;
        parse_quote(&text, symbol)
    }

    async fn get_candles(
        &self,
        ctx: &RequestContext,
        request: &CandleRequest,
    ) -> Result<SeriesResponse, MarketDataError> {
        let endpoint = match request.kind {
            InstrumentKind::Equity => "/stock/candle",
            InstrumentKind::SyntheticFx => "/forex/candle",
        };
        let from = request.from.to_string();
        let to = request.to.to_string();
        let params = [
            ("symbol", request.symbol.as_str()),
            ("resolution", request.resolution.finnhub_code()),
            ("from", from.as_str()),
            ("to", to.as_str()),
        ];

        let text = self.fetch(ctx, endpoint, &params).await?;
        parse_candles(&text, &request.symbol)
    }

    async fn discover_synthetic_pairs(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<SyntheticPair>, MarketDataError> {
        let text = self
            .fetch(ctx, "/forex/symbol", &[("exchange", PAIR_EXCHANGE)])
            .await?;
        let pairs = parse_forex_symbols(&text)?;
        debug!("Finnhub: discovered {} {} pairs", pairs.len(), PAIR_EXCHANGE);
        Ok(pairs)
    }

    async fn get_economic_calendar(
        &self,
        ctx: &RequestContext,
        from: &str,
        to: &str,
    ) -> Result<Vec<EconomicEvent>, MarketDataError> {
        let text = self
            .fetch(ctx, "/calendar/economic", &[("from", from), ("to", to)])
            .await?;
        parse_calendar(&text)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use tokio_util::sync::CancellationToken;

    fn provider() -> FinnhubProvider {
        FinnhubProvider::new(ApiKeyring::new().with_key("global", "test_key"))
    }

    #[test]
    fn test_provider_id() {
        assert_eq!(provider().id(), "FINNHUB");
    }

    #[test]
    fn test_provider_capabilities() {
        let caps = provider().capabilities();
        assert!(caps.supports_quotes);
        assert!(caps.supports_candles);
        assert!(caps.supports_pair_discovery);
        assert!(caps.supports_calendar);
        assert!(!caps.supports_today_only);
    }

    #[test]
    fn test_ensure_credentials() {
        let provider = provider();
        assert!(provider.ensure_credentials("global").is_ok());
        let err = provider.ensure_credentials("rates").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let ctx = RequestContext::new("calendar");
        let err = provider()
            .get_quote(&ctx, "SPY", InstrumentKind::Equity)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketDataError::MissingApiKey { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_context_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = RequestContext::new("global").with_cancel(cancel);
        let err = provider()
            .get_quote(&ctx, "SPY", InstrumentKind::Equity)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketDataError::Cancelled));
    }

    #[test]
    fn test_parse_quote() {
        let json = r#"{"c":512.3,"d":2.1,"dp":0.41,"h":514.0,"l":509.9,"o":510.2,"pc":510.2,"t":1704474000}"#;
        let quote = parse_quote(json, "SPY").unwrap();
        assert_eq!(quote.price, 512.3);
        assert_eq!(quote.percent_change, Some(0.41));
        assert_eq!(quote.previous_close, Some(510.2));
        assert_eq!(quote.timestamp, Some(1704474000));
        assert_eq!(quote.source, "FINNHUB");
    }

    #[test]
    fn test_parse_zero_quote_is_invalid_data() {
        let json = r#"{"c":0,"d":null,"dp":null,"h":0,"l":0,"o":0,"pc":0,"t":0}"#;
        let err = parse_quote(json, "BADSYM").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_parse_quote_without_price() {
        let err = parse_quote("{}", "BADSYM").unwrap_err();
        assert!(matches!(err, MarketDataError::SymbolNotFound(_)));
    }

    #[test]
    fn test_parse_candles() {
        let json = r#"{
            "s": "ok",
            "t": [1704474000, 1704474060],
            "o": [100.0, 101.0],
            "h": [101.5, 102.0],
            "l": [99.5, 100.5],
            "c": [101.0, 101.8],
            "v": [1200, 900]
        }"#;
        let bars = parse_candles(json, "SPY").unwrap().into_bars();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[1].close, 101.8);
        assert_eq!(bars[1].volume, Some(900.0));
    }

    #[test]
    fn test_parse_candles_without_volume() {
        let json = r#"{"s":"ok","t":[1],"o":[1.0],"h":[1.0],"l":[1.0],"c":[1.0]}"#;
        let bars = parse_candles(json, "OANDA:XAU_USD").unwrap().into_bars();
        assert_eq!(bars[0].volume, None);
    }

    #[test]
    fn test_parse_candles_no_data() {
        let response = parse_candles(r#"{"s":"no_data"}"#, "SPY").unwrap();
        assert_eq!(response, SeriesResponse::NoData);
    }

    #[test]
    fn test_parse_candles_mismatched_lengths() {
        let json = r#"{"s":"ok","t":[1,2],"o":[1.0],"h":[1.0],"l":[1.0],"c":[1.0]}"#;
        let err = parse_candles(json, "SPY").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_parse_forex_symbols() {
        let json = r#"[
            {"description":"Oanda Gold","displaySymbol":"XAU/USD","symbol":"OANDA:XAU_USD"},
            {"description":"Oanda Silver","displaySymbol":"XAG/USD","symbol":"OANDA:XAG_USD"},
            {"description":"broken","displaySymbol":"","symbol":"OANDA:NOPE"}
        ]"#;
        let pairs = parse_forex_symbols(json).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].compact_code(), "XAUUSD");
        assert_eq!(pairs[0].native_id, "OANDA:XAU_USD");
    }

    #[test]
    fn test_parse_calendar() {
        let json = r#"{"economicCalendar":[
            {"actual":3.1,"country":"US","estimate":3.2,"event":"CPI YoY","impact":"High","prev":3.4,"time":"2024-01-11 13:30:00","unit":"%"},
            {"country":"DE","event":"Factory Orders","impact":2,"time":"2024-01-08 07:00:00"},
            {"country":"US","event":"Jobless Claims","impact":null}
        ]}"#;
        let events = parse_calendar(json).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].impact.as_deref(), Some("high"));
        assert_eq!(events[0].actual, Some(3.1));
        assert_eq!(events[1].impact.as_deref(), Some("medium"));
        assert_eq!(events[2].impact, None);
    }

    #[test]
    fn test_parse_empty_calendar() {
        assert!(parse_calendar("{}").unwrap().is_empty());
    }
}

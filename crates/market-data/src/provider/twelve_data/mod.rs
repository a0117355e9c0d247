//! Twelve Data market data provider implementation.
//!
//! Used as the secondary source for intraday and daily OHLC series via the
//! /time_series endpoint. Credits are counted per symbol, so requests are
//! issued one symbol at a time.
//!
//! API documentation: https://twelvedata.com/docs#time-series

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::errors::MarketDataError;
use crate::models::{Bar, CandleRequest, RequestContext, SeriesResponse};
use crate::provider::status::error_for_status;
use crate::provider::{ApiKeyring, MarketDataProvider, ProviderCapabilities};

const BASE_URL: &str = "https://api.twelvedata.com";
const PROVIDER_ID: &str = "TWELVE_DATA";

/// Upper bound accepted by /time_series for `outputsize`.
const MAX_OUTPUT_SIZE: i64 = 5000;

// ============================================================================
// API Response Structures
// ============================================================================

/// Response from /time_series. Errors arrive with HTTP 200 and `status: "error"`.
#[derive(Debug, Deserialize)]
struct TimeSeriesResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    values: Vec<TimeSeriesValue>,
}

#[derive(Debug, Deserialize)]
struct TimeSeriesValue {
    datetime: String,
    #[serde(deserialize_with = "lenient_f64")]
    open: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    high: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    low: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    close: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    volume: Option<f64>,
}

/// Twelve Data encodes prices as strings ("512.30000").
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite()))
}

// ============================================================================
// TwelveDataProvider
// ============================================================================

/// Twelve Data time-series provider.
///
/// Datetimes are requested and interpreted in `timezone` (market time), then
/// converted to UTC seconds.
pub struct TwelveDataProvider {
    client: Client,
    keyring: ApiKeyring,
    base_url: String,
    timezone: Tz,
}

impl TwelveDataProvider {
    /// Create a new Twelve Data provider with the given credentials.
    pub fn new(keyring: ApiKeyring) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            keyring,
            base_url: BASE_URL.to_string(),
            timezone: chrono_tz::America::New_York,
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch(
        &self,
        ctx: &RequestContext,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<String, MarketDataError> {
        let token = self.keyring.require(PROVIDER_ID, &ctx.scope)?;
        if ctx.is_cancelled() {
            return Err(MarketDataError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                debug!("Twelve Data request cancelled: {}", endpoint);
                Err(MarketDataError::Cancelled)
            }
            result = self.send(endpoint, params, &token) => result,
        }
    }

    async fn send(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        token: &str,
    ) -> Result<String, MarketDataError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("Twelve Data request: {} with {} params", endpoint, params.len());

        let response = self
            .client
            .get(&url)
            .query(&[("apikey", token)])
            .query(params)
            .send()
            .await
            .map_err(|e| {
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
            let message = serde_json::from_str::<TimeSeriesResponse>(&body)
                .ok()
                .and_then(|r| r.message)
                .unwrap_or_else(|| format!("Twelve Data HTTP {}", status.as_u16()));
            return Err(error_for_status(PROVIDER_ID, status.as_u16(), message));
        }

        Ok(body)
    }

    fn format_local(&self, unix_seconds: i64) -> Option<String> {
        Utc.timestamp_opt(unix_seconds, 0)
            .single()
            .map(|dt| {
                dt.with_timezone(&self.timezone)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
    }

    fn request_params(&self, request: &CandleRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("symbol", request.symbol.clone()),
            ("interval", request.resolution.twelve_data_interval().to_string()),
            ("timezone", self.timezone.name().to_string()),
            ("format", "JSON".to_string()),
        ];

        let output_size = match request.limit {
            Some(limit) => i64::from(limit),
            None => (request.to - request.from) / request.resolution.seconds() + 1,
        };
        params.push((
            "outputsize",
            output_size.clamp(1, MAX_OUTPUT_SIZE).to_string(),
        ));

        if request.today_only {
            params.push(("date", "today".to_string()));
        } else if request.limit.is_none() {
            if let Some(start) = self.format_local(request.from) {
                params.push(("start_date", start));
            }
            if let Some(end) = self.format_local(request.to) {
                params.push(("end_date", end));
            }
        }

        params
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses `YYYY-MM-DD[ HH:MM[:SS]]` as wall-clock time in `tz`.
fn parse_local_datetime(raw: &str, tz: Tz) -> Option<i64> {
    let raw = raw.trim();
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    // Ambiguous fall-back hours resolve to the first occurrence; skipped
    // spring-forward hours fall through to None
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
}

fn parse_time_series(text: &str, symbol: &str, tz: Tz) -> Result<SeriesResponse, MarketDataError> {
    let response: TimeSeriesResponse = serde_json::from_str(text).map_err(|e| {
        MarketDataError::provider(PROVIDER_ID, format!("Failed to parse time series: {}", e))
    })?;

    let status = response.status.as_deref().unwrap_or("ok").to_lowercase();
    if status == "error" {
        let message = response
            .message
            .unwrap_or_else(|| "Twelve Data error".to_string());
        // "No data is available on the specified dates" is an empty window, not a failure
        if message.to_lowercase().contains("no data") {
            return Ok(SeriesResponse::NoData);
        }
        return Err(error_for_status(
            PROVIDER_ID,
            response.code.unwrap_or(500),
            message,
        ));
    }

    let mut bars = Vec::with_capacity(response.values.len());
    for value in response.values {
        let Some(timestamp) = parse_local_datetime(&value.datetime, tz) else {
            warn!("Skipping unparsable datetime '{}' for {}", value.datetime, symbol);
            continue;
        };
        let (Some(open), Some(high), Some(low), Some(close)) =
            (value.open, value.high, value.low, value.close)
        else {
            continue;
        };
        bars.push(Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume: value.volume,
        });
    }

    debug!("Twelve Data: parsed {} bars for {}", bars.len(), symbol);
    Ok(SeriesResponse::from_bars(bars))
}

// ============================================================================
// MarketDataProvider Implementation
// ============================================================================

#[async_trait]
impl MarketDataProvider for TwelveDataProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_candles: true,
            supports_today_only: true,
            ..Default::default()
        }
    }

    fn ensure_credentials(&self, scope: &str) -> Result<(), MarketDataError> {
        self.keyring.require(PROVIDER_ID, scope).map(|_| ())
    }

    async fn get_candles(
        &self,
        ctx: &RequestContext,
        request: &CandleRequest,
    ) -> Result<SeriesResponse, MarketDataError> {
        let params = self.request_params(request);
        let text = self.fetch(ctx, "/time_series", &params).await?;
        parse_time_series(&text, &request.symbol, self.timezone)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::models::{InstrumentKind, Resolution};
    use chrono_tz::America::New_York;

    fn provider() -> TwelveDataProvider {
        TwelveDataProvider::new(ApiKeyring::new().with_key("global", "td_key"))
    }

    fn param<'a>(params: &'a [(&str, String)], name: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_capabilities() {
        let caps = provider().capabilities();
        assert!(caps.supports_candles);
        assert!(caps.supports_today_only);
        assert!(!caps.supports_quotes);
        assert!(!caps.supports_pair_discovery);
    }

    #[test]
    fn test_parse_local_datetime_respects_dst() {
        // 2024-01-05 09:30 EST = 14:30 UTC
        assert_eq!(
            parse_local_datetime("2024-01-05 09:30:00", New_York),
            Some(1704465000)
        );
        // 2024-07-05 09:30 EDT = 13:30 UTC
        assert_eq!(
            parse_local_datetime("2024-07-05 09:30:00", New_York),
            Some(1720186200)
        );
        // Daily bars carry only a date
        assert_eq!(
            parse_local_datetime("2024-01-05", New_York),
            Some(1704430800)
        );
        assert_eq!(parse_local_datetime("yesterday", New_York), None);
    }

    #[test]
    fn test_parse_time_series() {
        let json = r#"{
            "meta": {"symbol": "SPY", "interval": "1min"},
            "values": [
                {"datetime":"2024-01-05 09:31:00","open":"470.1","high":"470.5","low":"469.9","close":"470.4","volume":"120000"},
                {"datetime":"2024-01-05 09:30:00","open":"469.8","high":"470.2","low":"469.5","close":"470.1","volume":"90000"},
                {"datetime":"garbage","open":"1","high":"1","low":"1","close":"1"}
            ],
            "status": "ok"
        }"#;
        let bars = parse_time_series(json, "SPY", New_York)
            .unwrap()
            .into_bars();
        assert_eq!(bars.len(), 2);
        // Twelve Data returns newest first; output is ascending
        assert_eq!(bars[0].timestamp, 1704465000);
        assert_eq!(bars[0].open, 469.8);
        assert_eq!(bars[1].close, 470.4);
        assert_eq!(bars[1].volume, Some(120000.0));
    }

    #[test]
    fn test_parse_body_level_error() {
        let json = r#"{"code":429,"message":"You have run out of API credits for the current minute.","status":"error"}"#;
        let err = parse_time_series(json, "SPY", New_York).unwrap_err();
        assert!(err.is_rate_limited());

        let json = r#"{"code":403,"message":"This symbol is available starting with Grow plan.","status":"error"}"#;
        let err = parse_time_series(json, "IEUR", New_York).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessRestricted);

        let json = r#"{"code":400,"message":"**symbol** not found: BADSYM.","status":"error"}"#;
        let err = parse_time_series(json, "BADSYM", New_York).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_parse_no_data_message() {
        let json = r#"{"code":400,"message":"No data is available on the specified dates. Try setting different start/end dates.","status":"error"}"#;
        let response = parse_time_series(json, "SPY", New_York).unwrap();
        assert_eq!(response, SeriesResponse::NoData);
    }

    #[test]
    fn test_today_only_params() {
        let request =
            CandleRequest::new("SPY", InstrumentKind::Equity, Resolution::OneMinute, 0, 0)
                .with_limit(800)
                .today_only();
        let params = provider().request_params(&request);
        assert_eq!(param(&params, "interval"), Some("1min"));
        assert_eq!(param(&params, "outputsize"), Some("800"));
        assert_eq!(param(&params, "date"), Some("today"));
        assert_eq!(param(&params, "timezone"), Some("America/New_York"));
        assert_eq!(param(&params, "start_date"), None);
    }

    #[test]
    fn test_range_params_use_local_dates() {
        let from = 1704465000; // 2024-01-05 09:30 EST
        let to = from + 90 * 24 * 60 * 60;
        let request = CandleRequest::new("SPY", InstrumentKind::Equity, Resolution::Daily, from, to);
        let params = provider().request_params(&request);
        assert_eq!(param(&params, "interval"), Some("1day"));
        assert_eq!(param(&params, "outputsize"), Some("91"));
        assert_eq!(param(&params, "start_date"), Some("2024-01-05 09:30:00"));
    }
}

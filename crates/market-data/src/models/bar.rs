use serde::{Deserialize, Serialize};

use super::instrument::InstrumentKind;

/// One OHLC bar. Timestamps are Unix seconds (UTC).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,

    /// Absent for instruments without volume (FX, metals)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    /// All four prices are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.open.is_finite() && self.high.is_finite() && self.low.is_finite() && self.close.is_finite()
    }
}

/// Normalized series answer from a provider adapter.
///
/// Adapters map provider-specific status strings ("no_data", empty `values`)
/// onto this type so downstream code never inspects raw payloads.
#[derive(Clone, Debug, PartialEq)]
pub enum SeriesResponse {
    /// Bars sorted ascending by timestamp
    Bars(Vec<Bar>),
    /// The provider answered but has nothing for the window
    NoData,
}

impl SeriesResponse {
    /// Wraps bars, collapsing an empty list into `NoData`.
    pub fn from_bars(mut bars: Vec<Bar>) -> Self {
        if bars.is_empty() {
            return Self::NoData;
        }
        bars.sort_by_key(|b| b.timestamp);
        Self::Bars(bars)
    }

    pub fn into_bars(self) -> Vec<Bar> {
        match self {
            Self::Bars(bars) => bars,
            Self::NoData => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bars(bars) => bars.is_empty(),
            Self::NoData => true,
        }
    }
}

/// Bar width requested from a provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    OneMinute,
    FifteenMinutes,
    OneHour,
    FourHours,
    Daily,
}

impl Resolution {
    /// Finnhub `resolution` parameter.
    pub fn finnhub_code(&self) -> &'static str {
        match self {
            Self::OneMinute => "1",
            Self::FifteenMinutes => "15",
            Self::OneHour => "60",
            // Finnhub has no 4h candles; callers aggregate 1h bars instead
            Self::FourHours => "60",
            Self::Daily => "D",
        }
    }

    /// Twelve Data `interval` parameter.
    pub fn twelve_data_interval(&self) -> &'static str {
        match self {
            Self::OneMinute => "1min",
            Self::FifteenMinutes => "15min",
            Self::OneHour => "1h",
            Self::FourHours => "4h",
            Self::Daily => "1day",
        }
    }

    /// Nominal bar width in seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            Self::OneMinute => 60,
            Self::FifteenMinutes => 15 * 60,
            Self::OneHour => 60 * 60,
            Self::FourHours => 4 * 60 * 60,
            Self::Daily => 24 * 60 * 60,
        }
    }
}

/// Parameters for a candle/time-series request.
#[derive(Clone, Debug, PartialEq)]
pub struct CandleRequest {
    /// Provider-native symbol (already resolved)
    pub symbol: String,
    pub kind: InstrumentKind,
    pub resolution: Resolution,
    /// Window start (Unix seconds, inclusive)
    pub from: i64,
    /// Window end (Unix seconds, inclusive)
    pub to: i64,
    /// Maximum number of bars, for providers that page by count
    pub limit: Option<u32>,
    /// Restrict to the current session day, for providers that support it
    pub today_only: bool,
}

impl CandleRequest {
    pub fn new(
        symbol: impl Into<String>,
        kind: InstrumentKind,
        resolution: Resolution,
        from: i64,
        to: i64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            kind,
            resolution,
            from,
            to,
            limit: None,
            today_only: false,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn today_only(mut self) -> Self {
        self.today_only = true;
        self
    }
}

//! Candle domain models.

use macrodash_market_data::Bar;
use serde::{Deserialize, Serialize};

use crate::timeframe::Timeframe;

/// Cached tier slots for one (tab, symbol).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleTier {
    #[serde(rename = "BASE_1M")]
    Base1m,
    #[serde(rename = "BASE_1H")]
    Base1h,
    #[serde(rename = "DERIVED_1D")]
    Derived1d,
    #[serde(rename = "DERIVED_1W")]
    Derived1w,
    #[serde(rename = "DERIVED_1M_4H")]
    Derived1m4h,
}

impl CandleTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base1m => "BASE_1M",
            Self::Base1h => "BASE_1H",
            Self::Derived1d => "DERIVED_1D",
            Self::Derived1w => "DERIVED_1W",
            Self::Derived1m4h => "DERIVED_1M_4H",
        }
    }

    /// Derived view backing a timeframe.
    pub fn for_timeframe(timeframe: Timeframe) -> Self {
        match timeframe {
            Timeframe::OneDay => Self::Derived1d,
            Timeframe::OneWeek => Self::Derived1w,
            Timeframe::OneMonth => Self::Derived1m4h,
        }
    }

    pub fn is_base(&self) -> bool {
        matches!(self, Self::Base1m | Self::Base1h)
    }
}

/// One cached tier: bars ascending by timestamp, weekdays only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleSeries {
    pub bars: Vec<Bar>,
    pub fetched_at_ms: i64,
    /// Provider identifier a base tier was fetched with
    #[serde(default)]
    pub source_symbol: Option<String>,
    /// Base tier a derived view was computed from
    #[serde(default)]
    pub derived_from: Option<CandleTier>,
}

/// Tile/chart view of a derived tier. Every field is best-effort.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleSnapshot {
    pub symbol: String,
    pub last: Option<f64>,
    pub change_pct: Option<f64>,
    pub candles: Vec<Bar>,
    pub fetched_at_ms: Option<i64>,
}

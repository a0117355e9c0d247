//! Baseline domain models.

use serde::{Deserialize, Serialize};

use crate::timeframe::Timeframe;

/// Historical closes used as the denominators of the 1W and 1M change.
///
/// The two values are independent: a short history can yield a week
/// baseline without a month one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineSet {
    pub week_ago_close: Option<f64>,
    pub month_ago_close: Option<f64>,
    pub fetched_at_ms: i64,
    /// Number of daily closes the values were computed from
    #[serde(default)]
    pub closes: usize,
    /// Provider that supplied the closes
    #[serde(default)]
    pub source: Option<String>,
    /// Why the last attempt produced nothing, for display only
    #[serde(default)]
    pub last_error: Option<String>,
}

impl BaselineSet {
    /// Picks `closes[n - week_offset]` and `closes[n - month_offset]` from an
    /// ascending close series.
    pub fn from_closes(
        closes: &[f64],
        week_offset: usize,
        month_offset: usize,
        fetched_at_ms: i64,
    ) -> Self {
        let back = |offset: usize| -> Option<f64> {
            let n = closes.len();
            if offset == 0 || n < offset {
                return None;
            }
            closes.get(n - offset).copied().filter(|c| c.is_finite() && *c != 0.0)
        };
        Self {
            week_ago_close: back(week_offset),
            month_ago_close: back(month_offset),
            fetched_at_ms,
            closes: closes.len(),
            source: None,
            last_error: None,
        }
    }

    pub fn close_for(&self, timeframe: Timeframe) -> Option<f64> {
        match timeframe {
            Timeframe::OneDay => None,
            Timeframe::OneWeek => self.week_ago_close,
            Timeframe::OneMonth => self.month_ago_close,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.week_ago_close.is_some() || self.month_ago_close.is_some()
    }
}

/// Tab-wide baseline bookkeeping.
///
/// Availability flags are `None` until one complete pass over the tab has
/// finished.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineTabMeta {
    pub last_updated_ms: i64,
    #[serde(default)]
    pub week_available: Option<bool>,
    #[serde(default)]
    pub month_available: Option<bool>,
}

//! Quote domain models.
//!
//! A [`QuoteRecord`] is the cached state of one (tab, symbol) tile; a
//! [`QuoteSnapshot`] is the read-only view derived from it for rendering.

use macrodash_market_data::{InstrumentKind, ProviderQuote};
use serde::{Deserialize, Serialize};

use crate::utils::{MarketTime, SessionWindow};

// =============================================================================
// Sparkline
// =============================================================================

/// One sparkline sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparkPoint {
    pub t_ms: i64,
    pub price: f64,
}

/// Appends `point` to `spark` while keeping its invariants.
///
/// - Timestamps stay strictly increasing; an out-of-order point is dropped.
/// - With a session window, points outside it are dropped and the line
///   restarts when a new market day begins.
/// - At most `max_points` are kept, oldest evicted first.
///
/// Returns whether the point was appended.
pub fn push_spark_point(
    spark: &mut Vec<SparkPoint>,
    point: SparkPoint,
    max_points: usize,
    session: Option<(&SessionWindow, &MarketTime)>,
) -> bool {
    if !point.price.is_finite() {
        return false;
    }

    if let Some((window, time)) = session {
        let secs = point.t_ms.div_euclid(1000);
        if !window.contains(time, secs) {
            return false;
        }
        let new_day = time.day(secs);
        let last_day = spark.last().and_then(|p| time.day(p.t_ms.div_euclid(1000)));
        if last_day.is_some() && last_day != new_day {
            spark.clear();
        }
    }

    if spark.last().is_some_and(|last| last.t_ms >= point.t_ms) {
        return false;
    }

    spark.push(point);
    if spark.len() > max_points {
        let excess = spark.len() - max_points;
        spark.drain(..excess);
    }
    true
}

// =============================================================================
// Records
// =============================================================================

/// Cached quote state for one (tab, symbol).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRecord {
    pub symbol: String,
    pub kind: InstrumentKind,
    /// Provider identifier the quote was actually fetched with
    pub resolved_symbol: String,
    pub last: f64,
    /// Raw provider payload, kept for the 1D change
    pub quote: ProviderQuote,
    /// Strictly increasing across successful writes
    pub updated_at_ms: i64,
    #[serde(default)]
    pub spark: Vec<SparkPoint>,
}

impl QuoteRecord {
    /// 1D change: the provider's own percent change, else derived from the
    /// previous close, else from the first spark point of the latest session
    /// day.
    pub fn one_day_change_pct(&self, time: &MarketTime) -> Option<f64> {
        if let Some(pct) = self.quote.percent_change.filter(|p| p.is_finite()) {
            return Some(pct);
        }
        if let Some(change) = self
            .quote
            .previous_close
            .and_then(|prev| pct_change(prev, self.last))
        {
            return Some(change);
        }

        let latest = self.spark.last()?;
        let latest_day = time.day(latest.t_ms.div_euclid(1000))?;
        let open = self
            .spark
            .iter()
            .find(|p| time.day(p.t_ms.div_euclid(1000)) == Some(latest_day))?;
        if open.t_ms == latest.t_ms {
            return None;
        }
        pct_change(open.price, self.last)
    }
}

/// Percent change from `from` to `to`; `None` when undefined.
pub fn pct_change(from: f64, to: f64) -> Option<f64> {
    if !from.is_finite() || !to.is_finite() || from == 0.0 {
        return None;
    }
    Some((to - from) / from * 100.0)
}

// =============================================================================
// Snapshot
// =============================================================================

/// What a tile renders. Every field is best-effort.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSnapshot {
    pub last: Option<f64>,
    pub change_pct: Option<f64>,
    pub spark: Vec<SparkPoint>,
    pub logo_ref: Option<String>,
    pub updated_at_ms: Option<i64>,
}

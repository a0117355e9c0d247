//! Pure transformations from base tiers to derived views.
//!
//! Every function takes bars ascending by timestamp and returns bars in the
//! same order. Calendar days are market-local.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use macrodash_market_data::Bar;

use crate::utils::MarketTime;

/// Sorts, drops duplicate timestamps and non-finite bars, and keeps
/// weekdays only.
pub fn filter_weekdays(mut bars: Vec<Bar>, time: &MarketTime) -> Vec<Bar> {
    bars.retain(|b| b.is_finite() && !time.is_weekend(b.timestamp));
    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    bars
}

/// Every bar whose day is among the `n` most recent distinct days present.
///
/// Days are collected by scanning backward from the newest bar, so the
/// result does not depend on how many bars each day has.
pub fn pick_last_n_days(bars: &[Bar], n: usize, time: &MarketTime) -> Vec<Bar> {
    if n == 0 {
        return Vec::new();
    }

    let mut days: HashSet<NaiveDate> = HashSet::with_capacity(n);
    for bar in bars.iter().rev() {
        if let Some(day) = time.day(bar.timestamp) {
            days.insert(day);
            if days.len() >= n {
                break;
            }
        }
    }

    bars.iter()
        .filter(|b| time.day(b.timestamp).is_some_and(|d| days.contains(&d)))
        .cloned()
        .collect()
}

/// Re-buckets bars into `hours`-wide aggregates aligned to local midnight.
///
/// open = first open, close = last close, high = max, low = min,
/// volume = sum, or `None` if any input volume is missing.
pub fn aggregate_buckets(bars: &[Bar], hours: u32, time: &MarketTime) -> Vec<Bar> {
    let mut buckets: BTreeMap<i64, (Bar, bool)> = BTreeMap::new();

    for bar in bars {
        let Some(start) = time.bucket_start(bar.timestamp, hours) else {
            continue;
        };
        buckets
            .entry(start)
            .and_modify(|(agg, volume_ok)| {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                match (agg.volume, bar.volume) {
                    (Some(total), Some(v)) if *volume_ok => agg.volume = Some(total + v),
                    _ => {
                        *volume_ok = false;
                        agg.volume = None;
                    }
                }
            })
            .or_insert_with(|| {
                let mut first = bar.clone();
                first.timestamp = start;
                let volume_ok = first.volume.is_some();
                (first, volume_ok)
            });
    }

    buckets.into_values().map(|(bar, _)| bar).collect()
}

/// Percent change from the first bar's open to the last bar's close.
pub fn change_pct(bars: &[Bar]) -> Option<f64> {
    let first = bars.first()?;
    let last = bars.last()?;
    if first.open == 0.0 || !first.open.is_finite() || !last.close.is_finite() {
        return None;
    }
    let pct = (last.close - first.open) / first.open * 100.0;
    pct.is_finite().then_some(pct)
}

pub fn last_close(bars: &[Bar]) -> Option<f64> {
    bars.last().map(|b| b.close).filter(|c| c.is_finite())
}

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use macrodash_market_data::{
    Bar, CandleRequest, InstrumentSpec, MarketDataError, MarketDataProvider, RequestContext,
    Resolution,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::cache::{keys, TieredCache};
use crate::candles::derive::pick_last_n_days;
use crate::config::IntradayServiceConfig;
use crate::constants::{
    INTRADAY_DAY_FALLBACK_LIMIT, INTRADAY_DAY_LIMIT, INTRADAY_MONTH_LIMIT, INTRADAY_WEEK_LIMIT,
    MONTH_TRADING_DAYS, WEEK_TRADING_DAYS,
};
use crate::errors::Result;
use crate::timeframe::Timeframe;
use crate::utils::{Clock, MarketTime};

const DAY_SECS: i64 = 24 * 60 * 60;

/// Cached intraday chart for one (tab, symbol, range).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntradaySeries {
    pub candles: Vec<Bar>,
    pub fetched_at_ms: i64,
}

/// Fetches session-filtered intraday bars from the time-series provider.
#[derive(Clone)]
pub struct IntradayService {
    provider: Arc<dyn MarketDataProvider>,
    cache: Arc<TieredCache>,
    clock: Arc<dyn Clock>,
    time: MarketTime,
    config: IntradayServiceConfig,
}

impl IntradayService {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        cache: Arc<TieredCache>,
        clock: Arc<dyn Clock>,
        time: MarketTime,
        config: IntradayServiceConfig,
    ) -> Self {
        Self {
            provider,
            cache,
            clock,
            time,
            config,
        }
    }

    pub fn get_cached(&self, tab: &str, symbol: &str, range: Timeframe) -> Option<IntradaySeries> {
        self.cache.get(&keys::intraday(tab, symbol, range.as_str()))
    }

    /// Returns the chart for `range`, fetching when the cached copy is older
    /// than the range TTL.
    ///
    /// Provider failures fall back to the cached copy, possibly `None`. A
    /// cancelled fetch writes nothing. Missing credentials are an error.
    pub async fn fetch(
        &self,
        tab: &str,
        spec: &InstrumentSpec,
        range: Timeframe,
        force: bool,
        cancel: Option<CancellationToken>,
    ) -> Result<Option<IntradaySeries>> {
        self.provider.ensure_credentials(tab)?;

        let key = keys::intraday(tab, &spec.symbol, range.as_str());
        let cached: Option<IntradaySeries> = self.cache.get(&key);
        if !force {
            if let Some(series) = cached.as_ref().filter(|s| self.is_fresh(s, range)) {
                debug!("Intraday {} {} in {} is fresh", spec.symbol, range, tab);
                return Ok(Some(series.clone()));
            }
        }

        let mut ctx = RequestContext::new(tab);
        if let Some(token) = cancel {
            ctx = ctx.with_cancel(token);
        }

        match self.fetch_range(&ctx, spec, range).await {
            Ok(candles) => {
                let series = IntradaySeries {
                    candles,
                    fetched_at_ms: self.clock.now_ms(),
                };
                self.cache.put(&key, &series);
                Ok(Some(series))
            }
            Err(MarketDataError::Cancelled) => {
                debug!("Intraday fetch for {} {} cancelled", spec.symbol, range);
                Ok(None)
            }
            Err(e) => {
                if e.is_access_restricted() {
                    warn!(
                        "Intraday {} chart for {} is restricted by the provider plan: {}",
                        range, spec.symbol, e
                    );
                } else {
                    warn!("Intraday fetch failed for {} {} in {}: {}", spec.symbol, range, tab, e);
                }
                Ok(cached)
            }
        }
    }

    /// Fetches every spec in order for one range. Failures are skipped.
    pub async fn prefetch_tab(
        &self,
        tab: &str,
        specs: &[InstrumentSpec],
        range: Timeframe,
        force: bool,
    ) -> Result<usize> {
        self.provider.ensure_credentials(tab)?;

        let mut fetched = 0;
        for (i, spec) in specs.iter().enumerate() {
            if i > 0 && !self.config.request_spacing.is_zero() {
                tokio::time::sleep(self.config.request_spacing).await;
            }
            if self.fetch(tab, spec, range, force, None).await?.is_some() {
                fetched += 1;
            }
        }
        Ok(fetched)
    }

    fn ttl(&self, range: Timeframe) -> Duration {
        match range {
            Timeframe::OneDay => self.config.ttl_day,
            Timeframe::OneWeek => self.config.ttl_week,
            Timeframe::OneMonth => self.config.ttl_month,
        }
    }

    fn is_fresh(&self, series: &IntradaySeries, range: Timeframe) -> bool {
        let age = self.clock.now_ms() - series.fetched_at_ms;
        series.fetched_at_ms > 0 && (age as i128) < self.ttl(range).as_millis() as i128
    }

    async fn fetch_range(
        &self,
        ctx: &RequestContext,
        spec: &InstrumentSpec,
        range: Timeframe,
    ) -> std::result::Result<Vec<Bar>, MarketDataError> {
        let now = self.clock.now_secs();
        let request = match range {
            Timeframe::OneDay => {
                let today = self
                    .time
                    .day(now)
                    .and_then(|d| self.time.start_of_day(d))
                    .unwrap_or(now - DAY_SECS);
                let request =
                    self.request(spec, Resolution::OneMinute, today, now, INTRADAY_DAY_LIMIT);
                if self.provider.capabilities().supports_today_only {
                    request.today_only()
                } else {
                    request
                }
            }
            Timeframe::OneWeek => self.request(
                spec,
                Resolution::FifteenMinutes,
                now - 14 * DAY_SECS,
                now,
                INTRADAY_WEEK_LIMIT,
            ),
            Timeframe::OneMonth => self.request(
                spec,
                Resolution::FourHours,
                now - 45 * DAY_SECS,
                now,
                INTRADAY_MONTH_LIMIT,
            ),
        };

        let bars = self.provider.get_candles(ctx, &request).await?.into_bars();
        let candles = self.post_filter(bars, range);
        if range != Timeframe::OneDay || candles.len() >= 2 {
            return Ok(candles);
        }

        // Outside the session "today" is empty; show the latest session instead
        debug!("No session today for {}, using trailing window", spec.symbol);
        let request = self.request(
            spec,
            Resolution::OneMinute,
            now - 7 * DAY_SECS,
            now,
            INTRADAY_DAY_FALLBACK_LIMIT,
        );
        let bars = self.provider.get_candles(ctx, &request).await?.into_bars();
        let week = self.post_filter(bars, Timeframe::OneWeek);
        Ok(pick_last_n_days(&week, 1, &self.time))
    }

    fn request(
        &self,
        spec: &InstrumentSpec,
        resolution: Resolution,
        from: i64,
        to: i64,
        limit: u32,
    ) -> CandleRequest {
        CandleRequest::new(&*spec.symbol, spec.kind, resolution, from, to).with_limit(limit)
    }

    /// Weekday in-session bars, windowed to the range's trading days.
    fn post_filter(&self, mut bars: Vec<Bar>, range: Timeframe) -> Vec<Bar> {
        bars.retain(|b| b.is_finite() && self.config.session.contains(&self.time, b.timestamp));
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);
        match range {
            Timeframe::OneDay => bars,
            Timeframe::OneWeek => pick_last_n_days(&bars, WEEK_TRADING_DAYS, &self.time),
            Timeframe::OneMonth => pick_last_n_days(&bars, MONTH_TRADING_DAYS, &self.time),
        }
    }
}

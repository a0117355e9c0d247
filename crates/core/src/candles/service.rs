//! Candle cache manager.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use macrodash_market_data::{
    Bar, CandleRequest, InstrumentSpec, MarketDataError, MarketDataProvider, ProviderSymbol,
    RequestContext, Resolution,
};
use serde::{Deserialize, Serialize};

use super::derive::{aggregate_buckets, change_pct, filter_weekdays, last_close, pick_last_n_days};
use super::model::{CandleSeries, CandleSnapshot, CandleTier};
use crate::cache::{keys, TieredCache};
use crate::config::CandleServiceConfig;
use crate::constants::{MONTH_TRADING_DAYS, WEEK_TRADING_DAYS};
use crate::errors::Result;
use crate::events::RefreshReason;
use crate::symbols::SymbolResolver;
use crate::timeframe::Timeframe;
use crate::utils::{first_success, Clock, InFlight, MarketTime};

/// In-flight key: (tab, cache key).
type FetchKey = (String, String);

/// One way of fetching a base tier.
#[derive(Clone)]
struct Strategy {
    provider: Arc<dyn MarketDataProvider>,
    symbol: ProviderSymbol,
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider.id(), self.symbol)
    }
}

/// Tab-level candle bookkeeping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleTabMeta {
    pub last_updated_ms: i64,
    pub reason: Option<RefreshReason>,
}

/// Fetches base candle tiers and maintains the derived 1D/1W/1M views.
#[derive(Clone)]
pub struct CandleService {
    primary: Arc<dyn MarketDataProvider>,
    secondary: Option<Arc<dyn MarketDataProvider>>,
    resolver: Arc<SymbolResolver>,
    cache: Arc<TieredCache>,
    clock: Arc<dyn Clock>,
    time: MarketTime,
    config: CandleServiceConfig,
    inflight: InFlight<FetchKey, bool>,
}

impl CandleService {
    pub fn new(
        primary: Arc<dyn MarketDataProvider>,
        resolver: Arc<SymbolResolver>,
        cache: Arc<TieredCache>,
        clock: Arc<dyn Clock>,
        time: MarketTime,
        config: CandleServiceConfig,
    ) -> Self {
        Self {
            primary,
            secondary: None,
            resolver,
            cache,
            clock,
            time,
            config,
            inflight: InFlight::new(),
        }
    }

    /// Provider tried after the primary for equities.
    pub fn with_secondary(mut self, provider: Arc<dyn MarketDataProvider>) -> Self {
        self.secondary = Some(provider);
        self
    }

    /// Refreshes stale base tiers for every spec and rewrites the derived views.
    ///
    /// Symbols are processed in order, spaced to respect upstream rate
    /// limits; one symbol's failure never affects the others. Returns how many symbols got new base data.
    pub async fn prefetch_tab(
        &self,
        tab: &str,
        specs: &[InstrumentSpec],
        force: bool,
        reason: RefreshReason,
    ) -> Result<usize> {
        self.primary.ensure_credentials(tab)?;
        if specs.iter().any(|s| s.is_synthetic()) && self.resolver.needs_discovery() {
            self.resolver.ensure_credentials()?;
        }

        let mut refreshed = 0;
        for (i, spec) in specs.iter().enumerate() {
            if i > 0 && !self.config.request_spacing.is_zero() {
                tokio::time::sleep(self.config.request_spacing).await;
            }
            if self.prefetch_symbol(tab, spec, force).await {
                refreshed += 1;
            }
        }

        let meta = CandleTabMeta {
            last_updated_ms: self.clock.now_ms(),
            reason: Some(reason),
        };
        self.cache.put(&keys::candle_meta(tab), &meta);

        info!(
            "Candle prefetch for {} ({}): {}/{} symbols refreshed",
            tab,
            reason.as_str(),
            refreshed,
            specs.len()
        );
        Ok(refreshed)
    }

    /// Refreshes one symbol; concurrent calls for the same key share the work.
    pub async fn prefetch_symbol(&self, tab: &str, spec: &InstrumentSpec, force: bool) -> bool {
        let key = (tab.to_string(), cache_key(spec));
        let this = self.clone();
        let tab = tab.to_string();
        let spec = spec.clone();
        let (refreshed, joined) = self
            .inflight
            .run(key, move || async move { this.refresh(&tab, &spec, force).await })
            .await;
        if joined {
            debug!("Joined in-flight candle prefetch");
        }
        refreshed
    }

    /// Derived view for a timeframe with its last price and change. Pure read.
    pub fn get_snapshot(
        &self,
        tab: &str,
        spec: &InstrumentSpec,
        timeframe: Timeframe,
    ) -> CandleSnapshot {
        let series = self.read_tier(tab, spec, CandleTier::for_timeframe(timeframe));
        let candles = series.as_ref().map(|s| s.bars.clone()).unwrap_or_default();
        CandleSnapshot {
            symbol: spec.symbol.to_string(),
            last: last_close(&candles),
            change_pct: change_pct(&candles),
            fetched_at_ms: series.map(|s| s.fetched_at_ms),
            candles,
        }
    }

    /// Bars of the derived view for a timeframe; empty when nothing is cached.
    pub fn get_candles(
        &self,
        tab: &str,
        spec: &InstrumentSpec,
        timeframe: Timeframe,
    ) -> Vec<Bar> {
        self.read_tier(tab, spec, CandleTier::for_timeframe(timeframe))
            .map(|s| s.bars)
            .unwrap_or_default()
    }

    pub fn read_tier(
        &self,
        tab: &str,
        spec: &InstrumentSpec,
        tier: CandleTier,
    ) -> Option<CandleSeries> {
        self.cache
            .get(&keys::candle_tier(tab, &cache_key(spec), tier.as_str()))
    }

    pub fn get_tab_last_updated_ms(&self, tab: &str) -> Option<i64> {
        self.cache
            .get::<CandleTabMeta>(&keys::candle_meta(tab))
            .map(|m| m.last_updated_ms)
            .filter(|ms| *ms > 0)
    }

    fn is_stale(&self, series: Option<&CandleSeries>, max_age: Duration) -> bool {
        match series {
            Some(s) if s.fetched_at_ms > 0 => {
                let age = self.clock.now_ms() - s.fetched_at_ms;
                age as i128 > max_age.as_millis() as i128
            }
            _ => true,
        }
    }

    async fn refresh(&self, tab: &str, spec: &InstrumentSpec, force: bool) -> bool {
        let fine = self.read_tier(tab, spec, CandleTier::Base1m);
        let coarse = self.read_tier(tab, spec, CandleTier::Base1h);
        let need_fine = force || self.is_stale(fine.as_ref(), self.config.fine_stale);
        let need_coarse = force || self.is_stale(coarse.as_ref(), self.config.coarse_stale);

        let strategies = if need_fine || need_coarse {
            self.strategies(tab, spec).await
        } else {
            Vec::new()
        };

        let ctx = RequestContext::new(tab);
        let (fresh_fine, fresh_coarse) = tokio::join!(
            async {
                if !need_fine {
                    return None;
                }
                self.fetch_base(
                    &ctx,
                    spec,
                    &strategies,
                    Resolution::OneMinute,
                    self.config.fine_lookback_days,
                )
                .await
            },
            async {
                if !need_coarse {
                    return None;
                }
                self.fetch_base(
                    &ctx,
                    spec,
                    &strategies,
                    Resolution::OneHour,
                    self.config.coarse_lookback_days,
                )
                .await
            },
        );

        let refreshed = fresh_fine.is_some() || fresh_coarse.is_some();
        if let Some(series) = &fresh_fine {
            self.write_tier(tab, spec, CandleTier::Base1m, series);
        }
        if let Some(series) = &fresh_coarse {
            self.write_tier(tab, spec, CandleTier::Base1h, series);
        }
        let fine = fresh_fine.or(fine).unwrap_or_default();
        let coarse = fresh_coarse.or(coarse).unwrap_or_default();

        self.write_derived(tab, spec, &fine, &coarse);
        refreshed
    }

    /// Ordered fetch strategies: resolved primary symbol, the secondary
    /// provider for equities, then the fallback symbol on each.
    async fn strategies(&self, tab: &str, spec: &InstrumentSpec) -> Vec<Strategy> {
        let primary_symbol = match self.resolver.resolve(spec).await {
            Ok(resolved) => resolved.provider_symbol,
            Err(e) => {
                warn!("Could not resolve {}: {}", spec.symbol, e);
                spec.symbol.clone()
            }
        };

        let secondary = self
            .secondary
            .clone()
            .filter(|_| !spec.is_synthetic())
            .filter(|p| p.capabilities().supports_candles)
            .filter(|p| match p.ensure_credentials(tab) {
                Ok(()) => true,
                Err(e) => {
                    debug!("Secondary candles disabled for {}: {}", tab, e);
                    false
                }
            });

        let mut symbols = vec![primary_symbol];
        if let Some(fallback) = spec.fallback_symbol.clone() {
            if !symbols.contains(&fallback) {
                symbols.push(fallback);
            }
        }

        let mut strategies = Vec::new();
        for symbol in symbols {
            strategies.push(Strategy {
                provider: self.primary.clone(),
                symbol: symbol.clone(),
            });
            if let Some(provider) = &secondary {
                // The secondary provider knows equities by their plain ticker
                strategies.push(Strategy {
                    provider: provider.clone(),
                    symbol,
                });
            }
        }
        strategies
    }

    async fn fetch_base(
        &self,
        ctx: &RequestContext,
        spec: &InstrumentSpec,
        strategies: &[Strategy],
        resolution: Resolution,
        lookback_days: i64,
    ) -> Option<CandleSeries> {
        let to = self.clock.now_secs();
        let from = to - lookback_days * 24 * 60 * 60;
        let time = &self.time;

        let outcome = first_success(strategies.iter().cloned(), |strategy| async move {
            let request =
                CandleRequest::new(&*strategy.symbol, spec.kind, resolution, from, to);
            let bars = strategy.provider.get_candles(ctx, &request).await?.into_bars();
            let bars = filter_weekdays(bars, time);
            if bars.is_empty() {
                // An empty answer moves on to the next strategy
                return Err(MarketDataError::NoDataForRange);
            }
            Ok(bars)
        })
        .await;

        match outcome {
            Ok((strategy, bars)) => Some(CandleSeries {
                bars,
                fetched_at_ms: self.clock.now_ms(),
                source_symbol: Some(strategy.symbol.to_string()),
                derived_from: None,
            }),
            Err(attempts) => {
                for (strategy, err) in &attempts {
                    if err.is_access_restricted() {
                        warn!(
                            "{} candles for {} via {:?} are restricted by the provider plan: {}",
                            resolution.twelve_data_interval(),
                            spec.symbol,
                            strategy,
                            err
                        );
                    }
                }
                warn!(
                    "No {} candles for {} after {} attempt(s)",
                    resolution.twelve_data_interval(),
                    spec.symbol,
                    attempts.len()
                );
                None
            }
        }
    }

    fn write_tier(
        &self,
        tab: &str,
        spec: &InstrumentSpec,
        tier: CandleTier,
        series: &CandleSeries,
    ) {
        self.cache.put(
            &keys::candle_tier(tab, &cache_key(spec), tier.as_str()),
            series,
        );
    }

    /// Derived views are rewritten on every pass so timeframe switches are
    /// served from cache.
    fn write_derived(
        &self,
        tab: &str,
        spec: &InstrumentSpec,
        fine: &CandleSeries,
        coarse: &CandleSeries,
    ) {
        let now = self.clock.now_ms();
        let derived = |bars: Vec<Bar>, from: CandleTier| CandleSeries {
            bars,
            fetched_at_ms: now,
            source_symbol: None,
            derived_from: Some(from),
        };

        let day = pick_last_n_days(&fine.bars, 1, &self.time);
        let week = pick_last_n_days(&coarse.bars, WEEK_TRADING_DAYS, &self.time);
        let month = aggregate_buckets(
            &pick_last_n_days(&coarse.bars, MONTH_TRADING_DAYS, &self.time),
            self.config.month_bucket_hours,
            &self.time,
        );

        self.write_tier(tab, spec, CandleTier::Derived1d, &derived(day, CandleTier::Base1m));
        self.write_tier(tab, spec, CandleTier::Derived1w, &derived(week, CandleTier::Base1h));
        self.write_tier(tab, spec, CandleTier::Derived1m4h, &derived(month, CandleTier::Base1h));
    }
}

/// Cache identity of a spec's candles: its declared symbol, so reads never
/// depend on resolution state.
fn cache_key(spec: &InstrumentSpec) -> String {
    spec.symbol.to_uppercase()
}

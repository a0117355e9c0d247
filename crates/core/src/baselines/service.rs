//! Baseline service: daily history fetch with a secondary provider fallback.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, info, warn};
use macrodash_market_data::{
    InstrumentSpec, MarketDataError, MarketDataProvider, ProviderSymbol, RequestContext,
};

use super::model::{BaselineSet, BaselineTabMeta};
use crate::cache::{keys, TieredCache};
use crate::config::BaselineServiceConfig;
use crate::constants::{MONTH_OFFSET, WEEK_OFFSET};
use crate::errors::Result;
use crate::symbols::SymbolResolver;
use crate::timeframe::Timeframe;
use crate::utils::{first_success, Clock};

/// Closes fetched for one symbol, with where they came from.
struct DailyCloses {
    closes: Vec<f64>,
    source: Option<&'static str>,
    error: Option<MarketDataError>,
}

/// Maintains per-symbol week/month baselines for each tab.
///
/// Failures are isolated per symbol: a symbol that cannot be fetched keeps
/// whatever baseline it had, and never disables the timeframe for the rest
/// of the tab.
#[derive(Clone)]
pub struct BaselineService {
    primary: Arc<dyn MarketDataProvider>,
    secondary: Option<Arc<dyn MarketDataProvider>>,
    resolver: Arc<SymbolResolver>,
    cache: Arc<TieredCache>,
    clock: Arc<dyn Clock>,
    config: BaselineServiceConfig,
}

impl BaselineService {
    pub fn new(
        primary: Arc<dyn MarketDataProvider>,
        resolver: Arc<SymbolResolver>,
        cache: Arc<TieredCache>,
        clock: Arc<dyn Clock>,
        config: BaselineServiceConfig,
    ) -> Self {
        Self {
            primary,
            secondary: None,
            resolver,
            cache,
            clock,
            config,
        }
    }

    /// Provider asked when the primary returns too short a history.
    pub fn with_secondary(mut self, provider: Arc<dyn MarketDataProvider>) -> Self {
        self.secondary = Some(provider);
        self
    }

    /// Brings every spec's baselines up to date.
    ///
    /// Returns `true` when at least one symbol of the tab has a usable
    /// baseline afterwards. Only a missing credential is an error.
    pub async fn ensure_baselines_for_tab(
        &self,
        tab: &str,
        specs: &[InstrumentSpec],
        force: bool,
    ) -> Result<bool> {
        self.primary.ensure_credentials(tab)?;

        let mut fetched = 0usize;
        let mut sets = Vec::with_capacity(specs.len());
        for spec in specs {
            let cached: Option<BaselineSet> = self.cache.get(&keys::baseline(tab, spec));
            if let Some(set) = cached.filter(|s| !force && self.is_fresh(s)) {
                sets.push(set);
                continue;
            }

            if fetched > 0 && !self.config.request_spacing.is_zero() {
                tokio::time::sleep(self.config.request_spacing).await;
            }
            fetched += 1;
            sets.push(self.refresh_symbol(tab, spec).await?);
        }

        let meta = BaselineTabMeta {
            last_updated_ms: self.clock.now_ms(),
            week_available: Some(sets.iter().any(|s| s.week_ago_close.is_some())),
            month_available: Some(sets.iter().any(|s| s.month_ago_close.is_some())),
        };
        self.cache.put(&keys::baseline_meta(tab), &meta);

        let usable = sets.iter().filter(|s| s.is_usable()).count();
        info!(
            "Baselines for {}: {}/{} symbols usable ({} fetched)",
            tab,
            usable,
            specs.len(),
            fetched
        );
        Ok(usable > 0)
    }

    /// Cached baseline close for the timeframe; `None` for 1D or when absent.
    pub fn get_baseline_close(
        &self,
        tab: &str,
        spec: &InstrumentSpec,
        timeframe: Timeframe,
    ) -> Option<f64> {
        self.get_baselines(tab, spec)?.close_for(timeframe)
    }

    pub fn get_baselines(&self, tab: &str, spec: &InstrumentSpec) -> Option<BaselineSet> {
        self.cache.get(&keys::baseline(tab, spec))
    }

    /// Whether a timeframe can be offered for the tab.
    ///
    /// 1D is always available. 1W/1M become unavailable only after a completed
    /// pass produced no baseline for that timeframe on any symbol; a later
    /// forced pass can make them available again.
    pub fn is_timeframe_available(&self, tab: &str, timeframe: Timeframe) -> bool {
        let meta: BaselineTabMeta = self
            .cache
            .get(&keys::baseline_meta(tab))
            .unwrap_or_default();
        match timeframe {
            Timeframe::OneDay => true,
            Timeframe::OneWeek => meta.week_available.unwrap_or(true),
            Timeframe::OneMonth => meta.month_available.unwrap_or(true),
        }
    }

    pub fn get_tab_last_updated_ms(&self, tab: &str) -> Option<i64> {
        self.cache
            .get::<BaselineTabMeta>(&keys::baseline_meta(tab))
            .map(|m| m.last_updated_ms)
            .filter(|ms| *ms > 0)
    }

    fn is_fresh(&self, set: &BaselineSet) -> bool {
        let age = self.clock.now_ms() - set.fetched_at_ms;
        set.fetched_at_ms > 0 && (age as i128) < self.config.ttl.as_millis() as i128
    }

    async fn refresh_symbol(&self, tab: &str, spec: &InstrumentSpec) -> Result<BaselineSet> {
        let key = keys::baseline(tab, spec);
        let previous: Option<BaselineSet> = self.cache.get(&key);

        let daily = self.fetch_closes(tab, spec).await?;
        let now = self.clock.now_ms();
        let mut set =
            BaselineSet::from_closes(&daily.closes, WEEK_OFFSET, MONTH_OFFSET, now);
        set.source = daily.source.map(str::to_string);

        if !set.is_usable() {
            let reason = daily
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| format!("only {} daily closes", daily.closes.len()));
            let restricted = daily.error.as_ref().filter(|e| e.is_access_restricted());
            if let Some(err) = restricted {
                warn!(
                    "Daily history for {} in {} is restricted by the provider plan, 1W/1M change unavailable for it: {}",
                    spec.symbol, tab, err
                );
            } else {
                debug!("No baseline for {} in {}: {}", spec.symbol, tab, reason);
            }

            // Keep the previous values and their age; only record the failure.
            // A restricted symbol waits for the TTL or a forced retry, anything
            // else is retried on the next cycle.
            let mut kept = previous.unwrap_or_default();
            kept.last_error = Some(reason);
            if restricted.is_some() {
                kept.fetched_at_ms = now;
            }
            self.cache.put(&key, &kept);
            return Ok(kept);
        }

        self.cache.put(&key, &set);
        Ok(set)
    }

    /// Primary provider first; the secondary is tried when the primary
    /// yields fewer than the configured minimum of closes. The longer series
    /// wins.
    async fn fetch_closes(&self, tab: &str, spec: &InstrumentSpec) -> Result<DailyCloses> {
        let to = DateTime::<Utc>::from_timestamp_millis(self.clock.now_ms()).unwrap_or_default();
        let from = to - ChronoDuration::days(self.config.lookback_days);
        let ctx = RequestContext::new(tab);

        let mut candidates: Vec<ProviderSymbol> = Vec::new();
        match self.resolver.resolve(spec).await {
            Ok(resolved) => candidates.push(resolved.provider_symbol),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Could not resolve {}: {}", spec.symbol, e);
                candidates.push(spec.symbol.clone());
            }
        }
        if let Some(fallback) = spec.fallback_symbol.clone() {
            if !candidates.contains(&fallback) {
                candidates.push(fallback);
            }
        }

        let primary = self.primary.clone();
        let mut best = match first_success(candidates, |symbol| {
            let ctx = &ctx;
            let primary = primary.clone();
            async move {
                closes_of(primary.get_daily_series(ctx, &symbol, spec.kind, from, to).await?)
            }
        })
        .await
        {
            Ok((_, closes)) => DailyCloses {
                closes,
                source: Some(self.primary.id()),
                error: None,
            },
            Err(mut attempts) => {
                if let Some((symbol, err)) = attempts.last() {
                    debug!("Primary daily history failed for {}: {}", symbol, err);
                }
                DailyCloses {
                    closes: Vec::new(),
                    source: None,
                    error: attempts.pop().map(|(_, e)| e),
                }
            }
        };

        if best.closes.len() >= self.config.min_closes || spec.is_synthetic() {
            return Ok(best);
        }
        let Some(secondary) = self
            .secondary
            .clone()
            .filter(|p| p.capabilities().supports_candles)
        else {
            return Ok(best);
        };
        if let Err(e) = secondary.ensure_credentials(tab) {
            debug!("Skipping secondary history for {}: {}", spec.symbol, e);
            return Ok(best);
        }

        match first_success(spec.candidates(), |symbol| {
            let ctx = &ctx;
            let secondary = secondary.clone();
            async move {
                closes_of(secondary.get_daily_series(ctx, &symbol, spec.kind, from, to).await?)
            }
        })
        .await
        {
            Ok((_, closes)) if closes.len() > best.closes.len() => {
                best = DailyCloses {
                    closes,
                    source: Some(secondary.id()),
                    error: None,
                };
            }
            Ok(_) => {}
            Err(mut attempts) => {
                if best.error.is_none() {
                    best.error = attempts.pop().map(|(_, e)| e);
                }
            }
        }
        Ok(best)
    }
}

/// Finite closes in time order; an empty history counts as a failure so the
/// next candidate is tried.
fn closes_of(
    bars: Vec<macrodash_market_data::Bar>,
) -> std::result::Result<Vec<f64>, MarketDataError> {
    let closes: Vec<f64> = bars
        .into_iter()
        .filter(|b| b.close.is_finite())
        .map(|b| b.close)
        .collect();
    if closes.is_empty() {
        return Err(MarketDataError::NoDataForRange);
    }
    Ok(closes)
}

//! Quote cache manager.

use std::sync::Arc;

use log::{debug, warn};
use macrodash_market_data::{
    InstrumentSpec, MarketDataError, MarketDataProvider, ProviderQuote, ProviderSymbol,
    RequestContext,
};

use super::model::{pct_change, push_spark_point, QuoteRecord, QuoteSnapshot, SparkPoint};
use crate::baselines::BaselineService;
use crate::cache::{keys, TabMeta, TieredCache};
use crate::config::QuoteServiceConfig;
use crate::errors::Result;
use crate::symbols::SymbolResolver;
use crate::timeframe::Timeframe;
use crate::utils::{first_success, Clock, InFlight, MarketTime};

/// In-flight key: (tab, symbol key).
type FetchKey = (String, String);

/// Serves tile quotes from cache and refreshes them from the quote provider.
///
/// Reads never touch the network. Refreshes are coalesced per (tab, symbol)
/// and try the resolved primary symbol before the configured fallback.
#[derive(Clone)]
pub struct QuoteService {
    provider: Arc<dyn MarketDataProvider>,
    resolver: Arc<SymbolResolver>,
    baselines: Arc<BaselineService>,
    cache: Arc<TieredCache>,
    clock: Arc<dyn Clock>,
    time: MarketTime,
    config: QuoteServiceConfig,
    inflight: InFlight<FetchKey, bool>,
}

impl QuoteService {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        resolver: Arc<SymbolResolver>,
        baselines: Arc<BaselineService>,
        cache: Arc<TieredCache>,
        clock: Arc<dyn Clock>,
        time: MarketTime,
        config: QuoteServiceConfig,
    ) -> Self {
        Self {
            provider,
            resolver,
            baselines,
            cache,
            clock,
            time,
            config,
            inflight: InFlight::new(),
        }
    }

    pub fn get_record(&self, tab: &str, spec: &InstrumentSpec) -> Option<QuoteRecord> {
        self.cache.get(&keys::quote_record(tab, spec))
    }

    /// Tile snapshot for the timeframe. Pure read.
    pub fn get_snapshot(
        &self,
        tab: &str,
        spec: &InstrumentSpec,
        timeframe: Timeframe,
    ) -> QuoteSnapshot {
        let Some(record) = self.get_record(tab, spec) else {
            return QuoteSnapshot {
                logo_ref: spec.logo_ref(),
                ..Default::default()
            };
        };

        let last = Some(record.last).filter(|l| l.is_finite());
        let change_pct = last.and_then(|last| match timeframe {
            Timeframe::OneDay => record.one_day_change_pct(&self.time),
            Timeframe::OneWeek | Timeframe::OneMonth => self
                .baselines
                .get_baseline_close(tab, spec, timeframe)
                .and_then(|base| pct_change(base, last)),
        });

        QuoteSnapshot {
            last,
            change_pct,
            spark: record.spark,
            logo_ref: spec.logo_ref(),
            updated_at_ms: Some(record.updated_at_ms),
        }
    }

    /// Refreshes one symbol unless its record is younger than the TTL.
    ///
    /// Returns whether the record changed. Concurrent calls for the same
    /// (tab, symbol) share one fetch and receive the same answer. A symbol
    /// that cannot be fetched leaves its record untouched and yields `false`;
    /// only missing credentials are an error.
    pub async fn ensure_fresh_symbol(
        &self,
        tab: &str,
        spec: &InstrumentSpec,
        force: bool,
    ) -> Result<bool> {
        self.provider.ensure_credentials(tab)?;
        if spec.is_synthetic() && self.resolver.needs_discovery() {
            self.resolver.ensure_credentials()?;
        }

        let key = (tab.to_string(), spec.symbol_key());
        let this = self.clone();
        let tab = tab.to_string();
        let spec = spec.clone();
        let (changed, joined) = self
            .inflight
            .run(key, move || async move { this.refresh(&tab, &spec, force).await })
            .await;
        if joined {
            debug!("Joined in-flight quote fetch");
        }
        Ok(changed)
    }

    /// Refreshes every spec in order, spaced to respect upstream rate limits.
    ///
    /// Returns the number of records that changed.
    pub async fn prefetch_tab(
        &self,
        tab: &str,
        specs: &[InstrumentSpec],
        force: bool,
    ) -> Result<usize> {
        let mut changed = 0;
        for (i, spec) in specs.iter().enumerate() {
            if i > 0 && !self.config.request_spacing.is_zero() {
                tokio::time::sleep(self.config.request_spacing).await;
            }
            if self.ensure_fresh_symbol(tab, spec, force).await? {
                changed += 1;
            }
        }
        debug!("Quote prefetch for {}: {}/{} changed", tab, changed, specs.len());
        Ok(changed)
    }

    pub fn get_tab_last_updated_ms(&self, tab: &str) -> Option<i64> {
        TabMeta::load(&self.cache, &keys::quote_meta(tab)).last_updated()
    }

    fn is_fresh(&self, record: &QuoteRecord) -> bool {
        let age = self.clock.now_ms() - record.updated_at_ms;
        record.updated_at_ms > 0 && (age as i128) < self.config.ttl.as_millis() as i128
    }

    async fn refresh(&self, tab: &str, spec: &InstrumentSpec, force: bool) -> bool {
        let existing = self.get_record(tab, spec);
        if !force && existing.as_ref().is_some_and(|r| self.is_fresh(r)) {
            debug!("Quote for {} in {} is fresh", spec.symbol, tab);
            return false;
        }

        let mut candidates: Vec<ProviderSymbol> = Vec::new();
        match self.resolver.resolve(spec).await {
            Ok(resolved) => candidates.push(resolved.provider_symbol),
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

        let ctx = RequestContext::new(tab);
        let provider = &self.provider;
        let outcome = first_success(candidates, |symbol| {
            let ctx = &ctx;
            async move {
                let quote = provider.get_quote(ctx, &symbol, spec.kind).await?;
                if !quote.has_usable_price() {
                    return Err(MarketDataError::InvalidData {
                        provider: provider.id().to_string(),
                        message: format!("placeholder price {} for {}", quote.price, symbol),
                    });
                }
                Ok(quote)
            }
        })
        .await;

        match outcome {
            Ok((symbol, quote)) => {
                self.store(tab, spec, existing, &symbol, quote);
                true
            }
            Err(attempts) => {
                for (symbol, err) in &attempts {
                    if err.is_access_restricted() {
                        warn!(
                            "Quote for {} ({}) in {} is restricted by the provider: {}",
                            spec.symbol, symbol, tab, err
                        );
                    }
                }
                warn!(
                    "Quote refresh failed for {} in {} after {} attempt(s)",
                    spec.symbol,
                    tab,
                    attempts.len()
                );
                false
            }
        }
    }

    fn store(
        &self,
        tab: &str,
        spec: &InstrumentSpec,
        existing: Option<QuoteRecord>,
        symbol: &str,
        quote: ProviderQuote,
    ) {
        let now = self.clock.now_ms();
        let (mut spark, updated_at_ms) = match existing {
            Some(prev) => (prev.spark, now.max(prev.updated_at_ms + 1)),
            None => (Vec::new(), now),
        };

        let session = self.config.session.as_ref().map(|w| (w, &self.time));
        push_spark_point(
            &mut spark,
            SparkPoint {
                t_ms: updated_at_ms,
                price: quote.price,
            },
            self.config.spark_max_points,
            session,
        );

        let record = QuoteRecord {
            symbol: spec.symbol.to_uppercase(),
            kind: spec.kind,
            resolved_symbol: symbol.to_uppercase(),
            last: quote.price,
            quote,
            updated_at_ms,
            spark,
        };
        self.cache.put(&keys::quote_record(tab, spec), &record);
        TabMeta::touch(&self.cache, &keys::quote_meta(tab), updated_at_ms);
    }
}

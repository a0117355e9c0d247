//! Wiring of the caching services behind one handle for the host.

use std::sync::Arc;

use log::{info, warn};
use macrodash_market_data::{Bar, InstrumentKind, InstrumentSpec, MarketDataProvider};
use serde::{Deserialize, Serialize};

use crate::baselines::BaselineService;
use crate::cache::{keys, CacheStore, TieredCache};
use crate::calendar::{CalendarService, CalendarSnapshot};
use crate::candles::{CandleService, CandleSnapshot};
use crate::config::{DashboardConfig, TabConfig};
use crate::errors::{Error, Result};
use crate::events::{EventSink, RefreshReason};
use crate::intraday::{IntradaySeries, IntradayService};
use crate::quotes::{QuoteService, SparkPoint};
use crate::symbols::SymbolResolver;
use crate::tabs::{
    AutoRefreshHandle, DashboardRefresher, DetailView, RefreshOutcome, RefreshPhase,
    TabOrchestrator,
};
use crate::timeframe::Timeframe;
use crate::utils::{Clock, MarketTime};

/// Upstream clients the dashboard fetches through.
#[derive(Clone)]
pub struct DashboardProviders {
    /// Quotes, candles, daily history, pair discovery and the calendar
    pub primary: Arc<dyn MarketDataProvider>,
    /// Time series used when the primary has no candles for an equity, and
    /// for intraday charts
    pub secondary: Option<Arc<dyn MarketDataProvider>>,
}

/// One instrument tile. Every value is best-effort.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileView {
    pub symbol: String,
    pub label: String,
    pub kind: InstrumentKind,
    pub logo_ref: Option<String>,
    pub last: Option<f64>,
    pub change_pct: Option<f64>,
    pub spark: Vec<SparkPoint>,
    pub candles: Vec<Bar>,
    pub updated_at_ms: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabTiles {
    pub tab: String,
    pub timeframe: Timeframe,
    /// False when no symbol of the tab has a baseline for this timeframe
    pub timeframe_available: bool,
    pub last_updated_ms: Option<i64>,
    pub tiles: Vec<TileView>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabStatus {
    pub id: String,
    pub last_updated_ms: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStatus {
    pub active_tab: String,
    pub phase: RefreshPhase,
    pub visible: bool,
    pub detail: Option<DetailView>,
    pub tabs: Vec<TabStatus>,
}

pub struct Dashboard {
    config: DashboardConfig,
    cache: Arc<TieredCache>,
    quotes: Arc<QuoteService>,
    baselines: Arc<BaselineService>,
    candles: Arc<CandleService>,
    calendar: Arc<CalendarService>,
    orchestrator: TabOrchestrator,
}

impl Dashboard {
    pub fn new(
        config: DashboardConfig,
        providers: DashboardProviders,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;

        let time = MarketTime::new(config.market_tz);
        let cache = Arc::new(TieredCache::new(store));
        let primary = providers.primary;
        if !primary.capabilities().supports_quotes {
            return Err(Error::InvalidConfigValue(format!(
                "primary provider {} does not serve quotes",
                primary.id()
            )));
        }
        let secondary = providers.secondary.filter(|p| {
            let usable = p.capabilities().supports_candles;
            if !usable {
                warn!("Ignoring secondary provider {}: no candles", p.id());
            }
            usable
        });
        let series = secondary.clone().unwrap_or_else(|| primary.clone());
        let calendar_source = [Some(&primary), secondary.as_ref()]
            .into_iter()
            .flatten()
            .find(|p| p.capabilities().supports_calendar)
            .cloned()
            .unwrap_or_else(|| primary.clone());

        let resolver = Arc::new(SymbolResolver::new(
            primary.clone(),
            cache.clone(),
            clock.clone(),
        ));

        let mut baselines = BaselineService::new(
            primary.clone(),
            resolver.clone(),
            cache.clone(),
            clock.clone(),
            config.baselines.clone(),
        );
        let mut candles = CandleService::new(
            primary.clone(),
            resolver.clone(),
            cache.clone(),
            clock.clone(),
            time,
            config.candles.clone(),
        );
        if let Some(secondary) = secondary {
            baselines = baselines.with_secondary(secondary.clone());
            candles = candles.with_secondary(secondary);
        }
        let baselines = Arc::new(baselines);
        let candles = Arc::new(candles);

        let quotes = Arc::new(QuoteService::new(
            primary.clone(),
            resolver,
            baselines.clone(),
            cache.clone(),
            clock.clone(),
            time,
            config.quotes.clone(),
        ));
        let intraday = Arc::new(IntradayService::new(
            series,
            cache.clone(),
            clock.clone(),
            time,
            config.intraday.clone(),
        ));
        let calendar = Arc::new(CalendarService::new(
            calendar_source,
            cache.clone(),
            clock.clone(),
            time,
        ));

        let refresher = Arc::new(DashboardRefresher::new(
            quotes.clone(),
            baselines.clone(),
            candles.clone(),
            intraday,
            calendar.clone(),
            events.clone(),
        ));
        let orchestrator = TabOrchestrator::new(
            config.tabs.clone(),
            config.orchestrator.clone(),
            refresher,
            events,
            clock,
        )?;

        Ok(Self {
            config,
            cache,
            quotes,
            baselines,
            candles,
            calendar,
            orchestrator,
        })
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn tabs(&self) -> &[TabConfig] {
        &self.config.tabs
    }

    pub fn orchestrator(&self) -> &TabOrchestrator {
        &self.orchestrator
    }

    /// Tiles of a macro tab, read from cache only.
    pub fn tiles(&self, tab_id: &str, timeframe: Timeframe) -> Result<TabTiles> {
        let tab = self.config.require_tab(tab_id)?;
        let tiles = tab
            .symbols
            .iter()
            .map(|spec| self.tile(&tab.id, spec, timeframe))
            .collect();

        Ok(TabTiles {
            tab: tab.id.clone(),
            timeframe,
            timeframe_available: self.baselines.is_timeframe_available(&tab.id, timeframe),
            last_updated_ms: self.orchestrator.last_updated_ms(&tab.id)?,
            tiles,
        })
    }

    /// Derived candle view for one symbol, read from cache only.
    pub fn candles(&self, tab_id: &str, symbol: &str, timeframe: Timeframe) -> Result<CandleSnapshot> {
        let (tab, spec) = self.find(tab_id, symbol)?;
        Ok(self.candles.get_snapshot(&tab.id, spec, timeframe))
    }

    pub async fn ensure_fresh_symbol(&self, tab_id: &str, symbol: &str, force: bool) -> Result<bool> {
        let (tab, spec) = self.find(tab_id, symbol)?;
        self.quotes.ensure_fresh_symbol(&tab.id, spec, force).await
    }

    pub fn is_timeframe_available(&self, tab_id: &str, timeframe: Timeframe) -> Result<bool> {
        let tab = self.config.require_tab(tab_id)?;
        Ok(self.baselines.is_timeframe_available(&tab.id, timeframe))
    }

    pub fn set_active_tab(&self, tab_id: &str) -> Result<bool> {
        self.orchestrator.set_active_tab(tab_id)
    }

    pub async fn refresh_active_tab(&self, force: bool, reason: RefreshReason) -> Result<RefreshOutcome> {
        self.orchestrator.refresh_active_tab(force, reason).await
    }

    pub async fn refresh_all(&self, force: bool, reason: RefreshReason) -> Result<RefreshOutcome> {
        self.orchestrator.refresh_all(force, reason).await
    }

    pub fn set_visibility(&self, visible: bool) {
        self.orchestrator.set_visibility(visible);
    }

    pub fn start_auto_refresh(&self) -> AutoRefreshHandle {
        self.orchestrator.start_auto_refresh()
    }

    pub async fn open_detail(
        &self,
        tab_id: &str,
        symbol: &str,
        range: Timeframe,
    ) -> Result<Option<IntradaySeries>> {
        self.orchestrator.open_detail(tab_id, symbol, range).await
    }

    pub fn close_detail(&self) -> bool {
        self.orchestrator.close_detail()
    }

    /// Drops every cached candle tier and the pair discovery table.
    ///
    /// Quotes and baselines survive. The host is expected to follow up with
    /// a forced refresh. Returns the number of keys removed.
    pub fn clear_macro_cache(&self) -> usize {
        let candles = self.cache.remove_prefix(keys::CANDLES_PREFIX);
        let pairs = self.cache.remove_prefix(keys::SYMBOL_MAP_KEY);
        info!("Cleared macro cache: {} candle keys, {} pair tables", candles, pairs);
        candles + pairs
    }

    pub async fn calendar(&self, force: bool) -> Result<CalendarSnapshot> {
        self.calendar.get_weekly_us(force).await
    }

    pub fn cached_calendar(&self) -> CalendarSnapshot {
        self.calendar.get_cached()
    }

    pub fn reset_calendar_cache(&self) {
        self.calendar.reset_cache();
    }

    pub fn status(&self) -> DashboardStatus {
        let tabs = self
            .config
            .tabs
            .iter()
            .map(|t| TabStatus {
                id: t.id.clone(),
                last_updated_ms: self.orchestrator.last_updated_ms(&t.id).ok().flatten(),
            })
            .collect();
        DashboardStatus {
            active_tab: self.orchestrator.active_tab(),
            phase: self.orchestrator.phase(),
            visible: self.orchestrator.is_visible(),
            detail: self.orchestrator.detail(),
            tabs,
        }
    }

    fn find(&self, tab_id: &str, symbol: &str) -> Result<(&TabConfig, &InstrumentSpec)> {
        let tab = self.config.require_tab(tab_id)?;
        let spec = tab.find_symbol(symbol).ok_or_else(|| Error::UnknownSymbol {
            tab: tab.id.clone(),
            symbol: symbol.to_string(),
        })?;
        Ok((tab, spec))
    }

    fn tile(&self, tab: &str, spec: &InstrumentSpec, timeframe: Timeframe) -> TileView {
        let quote = self.quotes.get_snapshot(tab, spec, timeframe);
        let candles = self.candles.get_snapshot(tab, spec, timeframe);
        TileView {
            symbol: spec.symbol.to_string(),
            label: spec.label().to_string(),
            kind: spec.kind,
            logo_ref: quote.logo_ref,
            last: quote.last.or(candles.last),
            change_pct: quote.change_pct,
            spark: quote.spark,
            candles: candles.candles,
            updated_at_ms: quote.updated_at_ms,
        }
    }
}

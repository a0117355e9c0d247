use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use macrodash_market_data::InstrumentSpec;
use tokio_util::sync::CancellationToken;

use crate::baselines::BaselineService;
use crate::calendar::CalendarService;
use crate::candles::CandleService;
use crate::config::{TabConfig, TabKind};
use crate::errors::Result;
use crate::events::{DashboardEvent, EventSink, RefreshReason};
use crate::intraday::{IntradaySeries, IntradayService};
use crate::quotes::QuoteService;
use crate::timeframe::Timeframe;

/// Refreshes the data behind one tab.
///
/// Implementations absorb per-symbol failures; an `Err` means a setup defect
/// such as a missing credential.
#[async_trait]
pub trait TabRefresher: Send + Sync {
    async fn refresh_tab(&self, tab: &TabConfig, force: bool, reason: RefreshReason) -> Result<()>;

    /// When the tab's data was last written, if ever.
    fn last_updated_ms(&self, tab: &TabConfig) -> Option<i64>;

    /// Intraday chart for the expanded tile view.
    async fn fetch_detail(
        &self,
        tab: &TabConfig,
        spec: &InstrumentSpec,
        range: Timeframe,
        cancel: CancellationToken,
    ) -> Result<Option<IntradaySeries>>;

    /// Time until the calendar should be refetched; `None` disables the timer.
    fn until_calendar_rollover(&self) -> Option<Duration> {
        None
    }
}

/// Refreshes macro tabs through the quote, baseline and candle services and
/// calendar tabs through the calendar service.
pub struct DashboardRefresher {
    quotes: Arc<QuoteService>,
    baselines: Arc<BaselineService>,
    candles: Arc<CandleService>,
    intraday: Arc<IntradayService>,
    calendar: Arc<CalendarService>,
    events: Arc<dyn EventSink>,
}

impl DashboardRefresher {
    pub fn new(
        quotes: Arc<QuoteService>,
        baselines: Arc<BaselineService>,
        candles: Arc<CandleService>,
        intraday: Arc<IntradayService>,
        calendar: Arc<CalendarService>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            quotes,
            baselines,
            candles,
            intraday,
            calendar,
            events,
        }
    }

    async fn refresh_macro(&self, tab: &TabConfig, force: bool, reason: RefreshReason) -> Result<()> {
        let id = tab.id.as_str();

        let changed = self.quotes.prefetch_tab(id, &tab.symbols, force).await?;
        self.events.emit(DashboardEvent::QuotesUpdated {
            tab: id.to_string(),
            changed,
        });

        let usable = self
            .baselines
            .ensure_baselines_for_tab(id, &tab.symbols, force)
            .await?;
        if !usable {
            debug!("No usable baselines for {}", id);
        }
        self.events.emit(DashboardEvent::BaselinesUpdated { tab: id.to_string() });

        self.candles.prefetch_tab(id, &tab.symbols, force, reason).await?;
        self.events.emit(DashboardEvent::CandlesUpdated { tab: id.to_string() });
        Ok(())
    }
}

#[async_trait]
impl TabRefresher for DashboardRefresher {
    async fn refresh_tab(&self, tab: &TabConfig, force: bool, reason: RefreshReason) -> Result<()> {
        match tab.kind {
            TabKind::Macro => self.refresh_macro(tab, force, reason).await,
            TabKind::Calendar => {
                let snapshot = self.calendar.get_weekly_us(force).await?;
                if snapshot.error.is_none() {
                    self.events.emit(DashboardEvent::CalendarUpdated);
                }
                Ok(())
            }
        }
    }

    fn last_updated_ms(&self, tab: &TabConfig) -> Option<i64> {
        match tab.kind {
            TabKind::Macro => {
                let quotes = self.quotes.get_tab_last_updated_ms(&tab.id);
                let candles = self.candles.get_tab_last_updated_ms(&tab.id);
                quotes.max(candles)
            }
            TabKind::Calendar => self.calendar.get_cached().last_fetch_ms,
        }
    }

    async fn fetch_detail(
        &self,
        tab: &TabConfig,
        spec: &InstrumentSpec,
        range: Timeframe,
        cancel: CancellationToken,
    ) -> Result<Option<IntradaySeries>> {
        self.intraday
            .fetch(&tab.id, spec, range, false, Some(cancel))
            .await
    }

    fn until_calendar_rollover(&self) -> Option<Duration> {
        Some(self.calendar.duration_until_next_boundary())
    }
}

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::TabRefresher;
use crate::config::{OrchestratorConfig, TabConfig, TabKind};
use crate::errors::{Error, Result};
use crate::events::{DashboardEvent, EventSink, RefreshReason};
use crate::intraday::IntradaySeries;
use crate::timeframe::Timeframe;
use crate::utils::Clock;

const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPhase {
    Idle,
    Refreshing,
}

/// What happened to a refresh request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// The request ran (followed by any intents queued meanwhile).
    Completed { tab: String },
    /// A refresh was already running; the request now sits in the pending slot.
    Queued,
}

/// The expanded tile currently open.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailView {
    pub tab: String,
    pub symbol: String,
    pub range: Timeframe,
}

#[derive(Clone, Copy, Debug)]
struct RefreshIntent {
    force: bool,
    reason: RefreshReason,
    loud: bool,
}

impl RefreshIntent {
    fn new(force: bool, reason: RefreshReason) -> Self {
        Self {
            force,
            reason,
            loud: matches!(reason, RefreshReason::Startup | RefreshReason::Manual),
        }
    }
}

struct State {
    phase: RefreshPhase,
    active_tab: String,
    pending: Option<RefreshIntent>,
}

struct OpenDetail {
    view: DetailView,
    cancel: CancellationToken,
}

struct Inner {
    tabs: Vec<TabConfig>,
    config: OrchestratorConfig,
    refresher: Arc<dyn TabRefresher>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    idle: Notify,
    detail: Mutex<Option<OpenDetail>>,
    visible: watch::Sender<bool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resets the phase if a refresh future is dropped before it finishes.
struct PhaseGuard<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            {
                let mut state = lock(&self.inner.state);
                state.phase = RefreshPhase::Idle;
                state.pending = None;
            }
            self.inner.idle.notify_waiters();
        }
    }
}

/// Drives refreshes for the dashboard tabs.
///
/// At most one refresh runs at a time. Requests arriving meanwhile overwrite
/// a single pending slot; when the running refresh ends the pending intent
/// is replayed against whichever tab is active at that moment. Background
/// batches (warmup of the other tabs, calendar rollover) hold the same slot:
/// they wait for a running refresh to end, and requests arriving during a
/// batch are queued behind it.
#[derive(Clone)]
pub struct TabOrchestrator {
    inner: Arc<Inner>,
}

impl TabOrchestrator {
    pub fn new(
        tabs: Vec<TabConfig>,
        config: OrchestratorConfig,
        refresher: Arc<dyn TabRefresher>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let active_tab = tabs
            .first()
            .map(|t| t.id.clone())
            .ok_or_else(|| Error::InvalidConfigValue("no tabs configured".to_string()))?;
        let (visible, _) = watch::channel(true);

        Ok(Self {
            inner: Arc::new(Inner {
                tabs,
                config,
                refresher,
                events,
                clock,
                state: Mutex::new(State {
                    phase: RefreshPhase::Idle,
                    active_tab,
                    pending: None,
                }),
                idle: Notify::new(),
                detail: Mutex::new(None),
                visible,
            }),
        })
    }

    pub fn tabs(&self) -> &[TabConfig] {
        &self.inner.tabs
    }

    pub fn tab(&self, id: &str) -> Result<&TabConfig> {
        self.inner
            .tabs
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::UnknownTab(id.to_string()))
    }

    pub fn active_tab(&self) -> String {
        lock(&self.inner.state).active_tab.clone()
    }

    pub fn phase(&self) -> RefreshPhase {
        lock(&self.inner.state).phase
    }

    pub fn has_pending(&self) -> bool {
        lock(&self.inner.state).pending.is_some()
    }

    pub fn is_visible(&self) -> bool {
        *self.inner.visible.borrow()
    }

    pub fn last_updated_ms(&self, tab_id: &str) -> Result<Option<i64>> {
        let tab = self.tab(tab_id)?;
        Ok(self.inner.refresher.last_updated_ms(tab))
    }

    /// Switches the active tab. Never fetches by itself.
    ///
    /// When `stale_after_activation` is configured and the tab's data is
    /// older than that, a non-forced refresh is spawned in the background.
    /// Returns whether one was.
    pub fn set_active_tab(&self, tab_id: &str) -> Result<bool> {
        let tab = self.tab(tab_id)?;
        let changed = {
            let mut state = lock(&self.inner.state);
            let changed = state.active_tab != tab.id;
            state.active_tab = tab.id.clone();
            changed
        };
        if changed {
            self.inner.events.emit(DashboardEvent::ActiveTabChanged {
                tab: tab.id.clone(),
            });
        }

        let Some(max_age) = self.inner.config.stale_after_activation else {
            return Ok(false);
        };
        let stale = match self.inner.refresher.last_updated_ms(tab) {
            Some(updated) => {
                let age = self.inner.clock.now_ms() - updated;
                age as i128 > max_age.as_millis() as i128
            }
            None => true,
        };
        if !stale {
            return Ok(false);
        }

        debug!("Tab {} is stale on activation, refreshing", tab.id);
        let this = self.clone();
        tokio::spawn(async move {
            this.log_result(
                this.refresh_active_tab(false, RefreshReason::Activation)
                    .await,
            );
        });
        Ok(true)
    }

    /// Refreshes the active tab, or queues the request if a refresh is running.
    pub async fn refresh_active_tab(
        &self,
        force: bool,
        reason: RefreshReason,
    ) -> Result<RefreshOutcome> {
        self.request(RefreshIntent::new(force, reason)).await
    }

    /// Refreshes the active tab, then every other tab silently.
    pub async fn refresh_all(&self, force: bool, reason: RefreshReason) -> Result<RefreshOutcome> {
        let outcome = self.refresh_active_tab(force, reason).await?;
        self.refresh_other_tabs(force, reason).await;
        Ok(outcome)
    }

    /// Suspends (hidden) or resumes (visible) the auto-refresh timer.
    pub fn set_visibility(&self, visible: bool) {
        let previous = self.inner.visible.send_replace(visible);
        if previous != visible {
            debug!("Dashboard visibility: {}", visible);
        }
    }

    /// Starts the background refresh tasks.
    ///
    /// Performs one loud refresh of the active tab, warms the other tabs
    /// silently, then refreshes every `auto_refresh_interval` while visible.
    /// A second task refetches calendar tabs at each weekly rollover. The
    /// tasks stop when the handle is stopped or dropped.
    pub fn start_auto_refresh(&self) -> AutoRefreshHandle {
        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        let this = self.clone();
        let token = cancel.clone();
        tasks.push(tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = this.auto_refresh_loop() => {}
            }
        }));

        let has_calendar = self.inner.tabs.iter().any(|t| t.kind == TabKind::Calendar);
        if has_calendar && self.inner.refresher.until_calendar_rollover().is_some() {
            let this = self.clone();
            let token = cancel.clone();
            tasks.push(tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = this.calendar_loop() => {}
                }
            }));
        }

        info!(
            "Auto-refresh started ({}s interval)",
            self.inner.config.auto_refresh_interval.as_secs()
        );
        AutoRefreshHandle { cancel, tasks }
    }

    /// Opens the expanded view and fetches its intraday chart.
    ///
    /// Opening another view, or closing this one, cancels the outstanding
    /// fetch; a superseded fetch yields `Ok(None)`.
    pub async fn open_detail(
        &self,
        tab_id: &str,
        symbol: &str,
        range: Timeframe,
    ) -> Result<Option<IntradaySeries>> {
        let tab = self.tab(tab_id)?;
        let spec = tab
            .find_symbol(symbol)
            .cloned()
            .ok_or_else(|| Error::UnknownSymbol {
                tab: tab.id.clone(),
                symbol: symbol.to_string(),
            })?;

        let cancel = CancellationToken::new();
        let open = OpenDetail {
            view: DetailView {
                tab: tab.id.clone(),
                symbol: spec.symbol.to_string(),
                range,
            },
            cancel: cancel.clone(),
        };
        if let Some(previous) = lock(&self.inner.detail).replace(open) {
            debug!(
                "Superseding detail fetch for {} {}",
                previous.view.symbol, previous.view.range
            );
            previous.cancel.cancel();
        }

        let result = self
            .inner
            .refresher
            .fetch_detail(tab, &spec, range, cancel.clone())
            .await;
        if cancel.is_cancelled() {
            return Ok(None);
        }
        result
    }

    /// Closes the expanded view, cancelling its fetch. Returns whether one was open.
    pub fn close_detail(&self) -> bool {
        match lock(&self.inner.detail).take() {
            Some(open) => {
                open.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn detail(&self) -> Option<DetailView> {
        lock(&self.inner.detail).as_ref().map(|d| d.view.clone())
    }

    async fn request(&self, intent: RefreshIntent) -> Result<RefreshOutcome> {
        let tab_id = {
            let mut state = lock(&self.inner.state);
            if state.phase == RefreshPhase::Refreshing {
                if state.pending.replace(intent).is_some() {
                    debug!("Replaced pending refresh intent");
                }
                return Ok(RefreshOutcome::Queued);
            }
            state.phase = RefreshPhase::Refreshing;
            state.active_tab.clone()
        };
        let mut guard = PhaseGuard {
            inner: &self.inner,
            armed: true,
        };

        let first = self.refresh_once(&tab_id, intent).await;
        self.drain_pending(&mut guard).await;

        first.map(|()| RefreshOutcome::Completed { tab: tab_id })
    }

    /// Replays pending intents until the slot is empty, then goes idle.
    async fn drain_pending(&self, guard: &mut PhaseGuard<'_>) {
        loop {
            let next = {
                let mut state = lock(&self.inner.state);
                match state.pending.take() {
                    Some(pending) => Some((state.active_tab.clone(), pending)),
                    None => {
                        state.phase = RefreshPhase::Idle;
                        guard.armed = false;
                        None
                    }
                }
            };
            let Some((tab, pending)) = next else {
                break;
            };
            debug!("Replaying pending {} refresh on {}", pending.reason.as_str(), tab);
            self.log_result(self.refresh_once(&tab, pending).await);
        }
        self.inner.idle.notify_waiters();
    }

    /// Waits until no refresh is running and takes the slot.
    async fn acquire_phase(&self) -> PhaseGuard<'_> {
        loop {
            let idle = self.inner.idle.notified();
            {
                let mut state = lock(&self.inner.state);
                if state.phase == RefreshPhase::Idle {
                    state.phase = RefreshPhase::Refreshing;
                    break;
                }
            }
            idle.await;
        }
        PhaseGuard {
            inner: &self.inner,
            armed: true,
        }
    }

    /// Silent refresh of the tabs picked by `include`, given the active tab id.
    /// Failures are logged.
    async fn refresh_silently<F>(&self, intent: RefreshIntent, include: F)
    where
        F: Fn(&TabConfig, &str) -> bool,
    {
        let mut guard = self.acquire_phase().await;
        let active = self.active_tab();
        for tab in self.inner.tabs.iter().filter(|&t| include(t, active.as_str())) {
            self.log_result(self.refresh_once(&tab.id, intent).await);
        }
        self.drain_pending(&mut guard).await;
    }

    async fn refresh_once(&self, tab_id: &str, intent: RefreshIntent) -> Result<()> {
        let tab = self.tab(tab_id)?;
        self.inner.events.emit(DashboardEvent::RefreshStarted {
            tab: tab.id.clone(),
            reason: intent.reason,
            loud: intent.loud,
        });
        let started = Instant::now();

        let result = self
            .inner
            .refresher
            .refresh_tab(tab, intent.force, intent.reason)
            .await;

        self.inner.events.emit(DashboardEvent::RefreshCompleted {
            tab: tab.id.clone(),
            reason: intent.reason,
            loud: intent.loud,
        });
        info!(
            "Refreshed {} ({}) in {:?}",
            tab.id,
            intent.reason.as_str(),
            started.elapsed()
        );
        result
    }

    async fn refresh_other_tabs(&self, force: bool, reason: RefreshReason) {
        let intent = RefreshIntent {
            force,
            reason,
            loud: false,
        };
        self.refresh_silently(intent, |tab, active| tab.id != active)
            .await;
    }

    async fn auto_refresh_loop(&self) {
        self.log_result(self.refresh_active_tab(false, RefreshReason::Startup).await);
        if self.inner.config.warm_other_tabs {
            self.refresh_other_tabs(false, RefreshReason::Warmup).await;
        }

        let period = self.inner.config.auto_refresh_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut visible = self.inner.visible.subscribe();

        loop {
            let is_visible = *visible.borrow_and_update();
            tokio::select! {
                _ = ticker.tick(), if is_visible => {
                    self.log_result(self.refresh_active_tab(false, RefreshReason::Timer).await);
                }
                changed = visible.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *visible.borrow_and_update() {
                        ticker.reset();
                        self.log_result(
                            self.refresh_active_tab(false, RefreshReason::Visibility).await,
                        );
                    } else {
                        debug!("Hidden, auto-refresh suspended");
                    }
                }
            }
        }
    }

    async fn calendar_loop(&self) {
        loop {
            let wait = self.inner.refresher.until_calendar_rollover().unwrap_or(WEEK);
            debug!("Next calendar rollover in {:?}", wait);
            tokio::time::sleep(wait).await;

            let intent = RefreshIntent {
                force: true,
                reason: RefreshReason::Calendar,
                loud: false,
            };
            self.refresh_silently(intent, |tab, _| tab.kind == TabKind::Calendar)
                .await;
        }
    }

    fn log_result<T>(&self, result: Result<T>) {
        if let Err(e) = result {
            warn!("Refresh failed: {}", e);
        }
    }
}

/// Keeps the auto-refresh tasks alive; stopping or dropping it ends them.
pub struct AutoRefreshHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl AutoRefreshHandle {
    pub fn stop(self) {
        drop(self);
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for AutoRefreshHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        for task in &self.tasks {
            task.abort();
        }
    }
}

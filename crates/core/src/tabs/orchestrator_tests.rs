//! Tests for TabOrchestrator.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use macrodash_market_data::{InstrumentSpec, MarketDataError};
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;

use super::{DetailView, RefreshOutcome, RefreshPhase, TabOrchestrator, TabRefresher};
use crate::config::{default_tabs, OrchestratorConfig, TabConfig};
use crate::errors::{Error, Result};
use crate::events::{DashboardEvent, MockEventSink, RefreshReason};
use crate::intraday::IntradaySeries;
use crate::timeframe::Timeframe;
use crate::utils::ManualClock;

const NOW_MS: i64 = 1_704_900_000_000;

type Call = (String, bool, RefreshReason);

#[derive(Default)]
struct MockRefresher {
    calls: Mutex<Vec<Call>>,
    gate: Option<Arc<Semaphore>>,
    updated: Mutex<HashMap<String, i64>>,
    failing: Mutex<HashSet<String>>,
    detail_release: Notify,
    rollover: Option<Duration>,
}

impl MockRefresher {
    fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let refresher = Self {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        (refresher, gate)
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn tabs_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|(tab, _, _)| tab).collect()
    }
}

#[async_trait]
impl TabRefresher for MockRefresher {
    async fn refresh_tab(&self, tab: &TabConfig, force: bool, reason: RefreshReason) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((tab.id.clone(), force, reason));
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.failing.lock().unwrap().contains(&tab.id) {
            return Err(Error::MarketData(MarketDataError::MissingApiKey {
                provider: "MOCK".to_string(),
                scope: tab.id.clone(),
            }));
        }
        Ok(())
    }

    fn last_updated_ms(&self, tab: &TabConfig) -> Option<i64> {
        self.updated.lock().unwrap().get(&tab.id).copied()
    }

    async fn fetch_detail(
        &self,
        _tab: &TabConfig,
        _spec: &InstrumentSpec,
        _range: Timeframe,
        cancel: CancellationToken,
    ) -> Result<Option<IntradaySeries>> {
        tokio::select! {
            _ = cancel.cancelled() => Ok(None),
            _ = self.detail_release.notified() => Ok(Some(IntradaySeries {
                candles: Vec::new(),
                fetched_at_ms: NOW_MS,
            })),
        }
    }

    fn until_calendar_rollover(&self) -> Option<Duration> {
        self.rollover
    }
}

fn orchestrator_with(
    refresher: Arc<MockRefresher>,
    config: OrchestratorConfig,
) -> (TabOrchestrator, MockEventSink) {
    let events = MockEventSink::new();
    let orchestrator = TabOrchestrator::new(
        default_tabs(),
        config,
        refresher,
        Arc::new(events.clone()),
        Arc::new(ManualClock::new(NOW_MS)),
    )
    .unwrap();
    (orchestrator, events)
}

fn orchestrator(refresher: Arc<MockRefresher>) -> (TabOrchestrator, MockEventSink) {
    orchestrator_with(refresher, OrchestratorConfig::default())
}

async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_refresh_runs_active_tab() {
    let refresher = Arc::new(MockRefresher::default());
    let (orch, events) = orchestrator(refresher.clone());

    let outcome = orch
        .refresh_active_tab(false, RefreshReason::Manual)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        RefreshOutcome::Completed {
            tab: "global".to_string()
        }
    );
    assert_eq!(
        refresher.calls(),
        vec![("global".to_string(), false, RefreshReason::Manual)]
    );
    assert_eq!(orch.phase(), RefreshPhase::Idle);
    assert_eq!(
        events.events(),
        vec![
            DashboardEvent::RefreshStarted {
                tab: "global".to_string(),
                reason: RefreshReason::Manual,
                loud: true
            },
            DashboardEvent::RefreshCompleted {
                tab: "global".to_string(),
                reason: RefreshReason::Manual,
                loud: true
            },
        ]
    );
}

#[tokio::test]
async fn test_pending_intent_is_last_write_wins_on_current_tab() {
    let (refresher, gate) = MockRefresher::gated();
    let refresher = Arc::new(refresher);
    let (orch, _) = orchestrator(refresher.clone());

    let running = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.refresh_active_tab(false, RefreshReason::Manual).await })
    };
    settle().await;
    assert_eq!(orch.phase(), RefreshPhase::Refreshing);

    let queued = orch
        .refresh_active_tab(false, RefreshReason::Timer)
        .await
        .unwrap();
    assert_eq!(queued, RefreshOutcome::Queued);
    orch.refresh_active_tab(true, RefreshReason::Manual)
        .await
        .unwrap();
    assert!(orch.has_pending());

    // The user moves on before the running refresh ends
    assert!(!orch.set_active_tab("rates").unwrap());

    gate.add_permits(2);
    let outcome = running.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        RefreshOutcome::Completed {
            tab: "global".to_string()
        }
    );
    assert_eq!(
        refresher.calls(),
        vec![
            ("global".to_string(), false, RefreshReason::Manual),
            ("rates".to_string(), true, RefreshReason::Manual),
        ]
    );
    assert_eq!(orch.phase(), RefreshPhase::Idle);
    assert!(!orch.has_pending());
}

#[tokio::test]
async fn test_activation_only_switches_tabs() {
    let refresher = Arc::new(MockRefresher::default());
    let (orch, events) = orchestrator(refresher.clone());

    assert!(!orch.set_active_tab("metals").unwrap());
    settle().await;
    assert!(refresher.calls().is_empty());
    assert_eq!(orch.active_tab(), "metals");
    assert_eq!(
        events.events(),
        vec![DashboardEvent::ActiveTabChanged {
            tab: "metals".to_string()
        }]
    );

    assert!(matches!(
        orch.set_active_tab("crypto"),
        Err(Error::UnknownTab(_))
    ));
    assert_eq!(orch.active_tab(), "metals");
}

#[tokio::test]
async fn test_stale_tab_refreshes_on_activation() {
    let refresher = Arc::new(MockRefresher::default());
    refresher
        .updated
        .lock()
        .unwrap()
        .insert("metals".to_string(), NOW_MS - 10_000);
    let config = OrchestratorConfig {
        stale_after_activation: Some(Duration::from_secs(30)),
        ..Default::default()
    };
    let (orch, _) = orchestrator_with(refresher.clone(), config);

    assert!(!orch.set_active_tab("metals").unwrap());
    assert!(orch.set_active_tab("rates").unwrap());
    settle().await;
    assert_eq!(
        refresher.calls(),
        vec![("rates".to_string(), false, RefreshReason::Activation)]
    );
}

#[tokio::test]
async fn test_failed_refresh_returns_to_idle() {
    let refresher = Arc::new(MockRefresher::default());
    refresher
        .failing
        .lock()
        .unwrap()
        .insert("global".to_string());
    let (orch, events) = orchestrator(refresher.clone());

    let result = orch.refresh_active_tab(true, RefreshReason::Manual).await;
    assert!(result.unwrap_err().is_fatal());
    assert_eq!(orch.phase(), RefreshPhase::Idle);
    assert_eq!(events.len(), 2);

    orch.set_active_tab("commo").unwrap();
    orch.refresh_active_tab(false, RefreshReason::Manual)
        .await
        .unwrap();
    assert_eq!(refresher.tabs_called(), vec!["global", "commo"]);
}

#[tokio::test]
async fn test_refresh_all_covers_other_tabs_silently() {
    let refresher = Arc::new(MockRefresher::default());
    let (orch, events) = orchestrator(refresher.clone());
    orch.set_active_tab("rates").unwrap();
    events.clear();

    orch.refresh_all(true, RefreshReason::Manual).await.unwrap();
    assert_eq!(
        refresher.tabs_called(),
        vec!["rates", "global", "metals", "commo", "calendar"]
    );
    let loud: Vec<bool> = events
        .events()
        .iter()
        .filter_map(|e| match e {
            DashboardEvent::RefreshStarted { loud, .. } => Some(*loud),
            _ => None,
        })
        .collect();
    assert_eq!(loud, vec![true, false, false, false, false]);
}

#[tokio::test]
async fn test_request_during_silent_batch_is_queued() {
    let (refresher, gate) = MockRefresher::gated();
    let refresher = Arc::new(refresher);
    let (orch, _) = orchestrator(refresher.clone());

    let running = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.refresh_all(false, RefreshReason::Timer).await })
    };
    settle().await;
    gate.add_permits(1);
    settle().await;
    // The active tab is done; the other tabs are now refreshing silently
    assert_eq!(refresher.tabs_called(), vec!["global", "metals"]);
    assert_eq!(orch.phase(), RefreshPhase::Refreshing);

    let queued = orch
        .refresh_active_tab(true, RefreshReason::Manual)
        .await
        .unwrap();
    assert_eq!(queued, RefreshOutcome::Queued);

    gate.add_permits(5);
    running.await.unwrap().unwrap();
    let calls = refresher.calls();
    assert_eq!(calls.len(), 6);
    assert_eq!(
        calls[5],
        ("global".to_string(), true, RefreshReason::Manual)
    );
    assert_eq!(orch.phase(), RefreshPhase::Idle);
    assert!(!orch.has_pending());
}

#[tokio::test]
async fn test_silent_batch_waits_for_running_refresh() {
    let (refresher, gate) = MockRefresher::gated();
    let refresher = Arc::new(refresher);
    let (orch, _) = orchestrator(refresher.clone());

    let running = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.refresh_active_tab(false, RefreshReason::Manual).await })
    };
    settle().await;
    let batch = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.refresh_all(true, RefreshReason::Timer).await })
    };
    settle().await;
    assert_eq!(refresher.tabs_called(), vec!["global"]);
    assert!(orch.has_pending());

    gate.add_permits(6);
    running.await.unwrap().unwrap();
    assert_eq!(batch.await.unwrap().unwrap(), RefreshOutcome::Queued);
    assert_eq!(
        refresher.calls(),
        vec![
            ("global".to_string(), false, RefreshReason::Manual),
            ("global".to_string(), true, RefreshReason::Timer),
            ("metals".to_string(), true, RefreshReason::Timer),
            ("commo".to_string(), true, RefreshReason::Timer),
            ("rates".to_string(), true, RefreshReason::Timer),
            ("calendar".to_string(), true, RefreshReason::Timer),
        ]
    );
    assert_eq!(orch.phase(), RefreshPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_auto_refresh_lifecycle() {
    let refresher = Arc::new(MockRefresher::default());
    let (orch, _) = orchestrator(refresher.clone());

    let handle = orch.start_auto_refresh();
    settle().await;
    assert_eq!(
        refresher.calls(),
        vec![
            ("global".to_string(), false, RefreshReason::Startup),
            ("metals".to_string(), false, RefreshReason::Warmup),
            ("commo".to_string(), false, RefreshReason::Warmup),
            ("rates".to_string(), false, RefreshReason::Warmup),
            ("calendar".to_string(), false, RefreshReason::Warmup),
        ]
    );

    tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;
    settle().await;
    assert_eq!(refresher.calls().len(), 6);
    assert_eq!(refresher.calls()[5].2, RefreshReason::Timer);

    // Hidden: the timer is suspended
    orch.set_visibility(false);
    settle().await;
    tokio::time::sleep(Duration::from_secs(20 * 60)).await;
    settle().await;
    assert_eq!(refresher.calls().len(), 6);

    // Visible again: one immediate refresh
    orch.set_visibility(true);
    settle().await;
    assert_eq!(refresher.calls().len(), 7);
    assert_eq!(refresher.calls()[6].2, RefreshReason::Visibility);

    handle.stop();
    tokio::time::sleep(Duration::from_secs(30 * 60)).await;
    settle().await;
    assert_eq!(refresher.calls().len(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_calendar_refreshes_at_rollover() {
    let refresher = Arc::new(MockRefresher {
        rollover: Some(Duration::from_secs(60 * 60)),
        ..Default::default()
    });
    let config = OrchestratorConfig {
        auto_refresh_interval: Duration::from_secs(2 * 60 * 60),
        warm_other_tabs: false,
        ..Default::default()
    };
    let (orch, _) = orchestrator_with(refresher.clone(), config);

    let handle = orch.start_auto_refresh();
    settle().await;
    assert_eq!(refresher.tabs_called(), vec!["global"]);

    tokio::time::sleep(Duration::from_secs(60 * 60 + 1)).await;
    settle().await;
    assert_eq!(
        refresher.calls()[1],
        ("calendar".to_string(), true, RefreshReason::Calendar)
    );
    assert!(!handle.is_stopped());
    drop(handle);
}

#[tokio::test]
async fn test_new_detail_cancels_previous_fetch() {
    let refresher = Arc::new(MockRefresher::default());
    let (orch, _) = orchestrator(refresher.clone());

    let first = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.open_detail("global", "SPY", Timeframe::OneDay).await })
    };
    settle().await;
    let second = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.open_detail("global", "qqq", Timeframe::OneWeek).await })
    };
    settle().await;

    assert!(first.await.unwrap().unwrap().is_none());
    refresher.detail_release.notify_one();
    assert!(second.await.unwrap().unwrap().is_some());
    assert_eq!(
        orch.detail(),
        Some(DetailView {
            tab: "global".to_string(),
            symbol: "QQQ".to_string(),
            range: Timeframe::OneWeek,
        })
    );

    assert!(orch.close_detail());
    assert!(orch.detail().is_none());
    assert!(!orch.close_detail());
}

#[tokio::test]
async fn test_close_detail_cancels_fetch() {
    let refresher = Arc::new(MockRefresher::default());
    let (orch, _) = orchestrator(refresher);

    let pending = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.open_detail("rates", "TLT", Timeframe::OneMonth).await })
    };
    settle().await;
    assert!(orch.close_detail());
    assert!(pending.await.unwrap().unwrap().is_none());

    assert!(matches!(
        orch.open_detail("rates", "SPY", Timeframe::OneDay).await,
        Err(Error::UnknownSymbol { .. })
    ));
}

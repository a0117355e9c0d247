use macrodash_core::events::{DashboardEvent, EventSink};
use tokio::sync::broadcast;

/// Lightweight broadcast bus that fans out dashboard events to any
/// connected clients.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DashboardEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: DashboardEvent) {
        // Lagging listeners are ignored to avoid blocking producers.
        let _ = self.sender.send(event);
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: DashboardEvent) {
        tracing::debug!("Dashboard event: {:?}", event);
        self.publish(event);
    }
}

/// SSE event name for a dashboard event.
pub fn event_name(event: &DashboardEvent) -> &'static str {
    match event {
        DashboardEvent::RefreshStarted { .. } => "refresh:start",
        DashboardEvent::RefreshCompleted { .. } => "refresh:complete",
        DashboardEvent::QuotesUpdated { .. } => "quotes:updated",
        DashboardEvent::CandlesUpdated { .. } => "candles:updated",
        DashboardEvent::BaselinesUpdated { .. } => "baselines:updated",
        DashboardEvent::CalendarUpdated => "calendar:updated",
        DashboardEvent::ActiveTabChanged { .. } => "tab:active",
    }
}

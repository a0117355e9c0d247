//! Event sink trait and implementations.

use std::sync::{Arc, Mutex};

use super::DashboardEvent;

/// Receives dashboard events.
///
/// `emit()` is called from the refresh path and must not block; hosts that
/// need async work should queue the event.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DashboardEvent);
}

/// Discards every event.
#[derive(Clone, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: DashboardEvent) {}
}

/// Collects events for assertions in tests.
#[derive(Clone, Default)]
pub struct MockEventSink {
    events: Arc<Mutex<Vec<DashboardEvent>>>,
}

impl MockEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DashboardEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MockEventSink {
    fn emit(&self, event: DashboardEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

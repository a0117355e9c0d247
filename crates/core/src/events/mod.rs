//! Dashboard events.
//!
//! Services return plain values; the tab orchestrator turns them into
//! [`DashboardEvent`]s and hands them to an [`EventSink`] supplied by the
//! host (the HTTP server, or a mock in tests).

mod dashboard_event;
mod sink;

pub use dashboard_event::*;
pub use sink::*;

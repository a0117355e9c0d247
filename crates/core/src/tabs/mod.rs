//! Tab refresh orchestration.
//!
//! [`TabOrchestrator`] owns the active tab, the single in-flight refresh with
//! its last-write-wins pending slot, and the background timers.
//! [`TabRefresher`] is the seam to the caching services.

mod orchestrator;
mod refresher;

#[cfg(test)]
mod orchestrator_tests;

pub use orchestrator::{AutoRefreshHandle, DetailView, RefreshOutcome, RefreshPhase, TabOrchestrator};
pub use refresher::{DashboardRefresher, TabRefresher};

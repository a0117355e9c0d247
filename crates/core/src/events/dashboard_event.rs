//! Dashboard event types.

use serde::{Deserialize, Serialize};

/// Why a refresh was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshReason {
    /// First refresh after the orchestrator starts
    Startup,
    /// Explicit user action
    Manual,
    /// Recurring auto-refresh tick
    Timer,
    /// The document became visible again
    Visibility,
    /// A tab was activated after its data went stale
    Activation,
    /// Background warm-up of tabs other than the active one
    Warmup,
    /// Weekly calendar rollover
    Calendar,
}

impl RefreshReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Manual => "manual",
            Self::Timer => "timer",
            Self::Visibility => "visibility",
            Self::Activation => "activation",
            Self::Warmup => "warmup",
            Self::Calendar => "calendar",
        }
    }
}

/// Facts about dashboard state changes, emitted by the orchestrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardEvent {
    /// A refresh cycle began. `loud` refreshes show a spinner.
    RefreshStarted {
        tab: String,
        reason: RefreshReason,
        loud: bool,
    },

    /// A refresh cycle finished, successfully or not.
    RefreshCompleted {
        tab: String,
        reason: RefreshReason,
        loud: bool,
    },

    /// Quote records changed for `changed` symbols.
    QuotesUpdated { tab: String, changed: usize },

    /// Candle tiers were rewritten.
    CandlesUpdated { tab: String },

    /// Week/month baselines were refreshed.
    BaselinesUpdated { tab: String },

    /// The weekly calendar snapshot was replaced.
    CalendarUpdated,

    /// The user switched tabs.
    ActiveTabChanged { tab: String },
}

impl DashboardEvent {
    /// Tab the event is about, if any.
    pub fn tab(&self) -> Option<&str> {
        match self {
            Self::RefreshStarted { tab, .. }
            | Self::RefreshCompleted { tab, .. }
            | Self::QuotesUpdated { tab, .. }
            | Self::CandlesUpdated { tab }
            | Self::BaselinesUpdated { tab }
            | Self::ActiveTabChanged { tab } => Some(tab),
            Self::CalendarUpdated => None,
        }
    }
}

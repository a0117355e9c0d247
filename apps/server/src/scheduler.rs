//! Background refresh lifecycle for the server.

use std::sync::Arc;

use macrodash_core::tabs::AutoRefreshHandle;
use tracing::info;

use crate::main_lib::AppState;

/// Starts the dashboard's auto-refresh and calendar rollover tasks.
///
/// The server has no notion of page visibility of its own; clients report it
/// through `POST /api/visibility`.
pub fn start_dashboard_scheduler(state: &Arc<AppState>) -> AutoRefreshHandle {
    let interval = state
        .dashboard
        .config()
        .orchestrator
        .auto_refresh_interval;
    info!(
        "Dashboard scheduler started ({}-second interval)",
        interval.as_secs()
    );
    state.dashboard.start_auto_refresh()
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

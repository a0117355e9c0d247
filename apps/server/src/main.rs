mod api;
mod config;
mod error;
mod events;
mod main_lib;
mod scheduler;

use api::app_router;
use config::Config;
use main_lib::{build_state, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();
    let state = build_state(&config)?;

    let refresh = scheduler::start_dashboard_scheduler(&state);

    let router = app_router(state, &config);
    tracing::info!("Listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(scheduler::shutdown_signal())
        .await?;

    refresh.stop();
    Ok(())
}

use std::sync::Arc;

use macrodash_core::cache::CacheStore;
#[cfg(test)]
use macrodash_core::cache::MemoryCacheStore;
use macrodash_core::utils::SystemClock;
use macrodash_core::{Dashboard, DashboardConfig, DashboardProviders};
use macrodash_market_data::{FinnhubProvider, MarketDataProvider, TwelveDataProvider};
use macrodash_storage_sqlite::SqliteCacheStore;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{config::Config, events::EventBus};

pub struct AppState {
    pub dashboard: Arc<Dashboard>,
    pub event_bus: EventBus,
}

pub fn init_tracing() {
    let log_format = std::env::var("MD_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let store: Arc<dyn CacheStore> = Arc::new(SqliteCacheStore::open(&config.db_path)?);
    tracing::info!("Cache database in use: {}", config.db_path);
    let state = build_state_with_store(config.dashboard(), config, store)?;
    Ok(Arc::new(state))
}

/// Wires providers, the cache store and the event bus into a dashboard.
pub fn build_state_with_store(
    dashboard_config: DashboardConfig,
    config: &Config,
    store: Arc<dyn CacheStore>,
) -> anyhow::Result<AppState> {
    if config.finnhub_keys.is_empty() {
        tracing::warn!("No Finnhub keys configured; every refresh will fail");
    }

    let finnhub = FinnhubProvider::new(config.finnhub_keys.clone());
    let primary: Arc<dyn MarketDataProvider> = Arc::new(finnhub);
    let secondary: Option<Arc<dyn MarketDataProvider>> = if config.twelvedata_keys.is_empty() {
        tracing::info!("No Twelve Data keys configured; secondary time series disabled");
        None
    } else {
        let provider = TwelveDataProvider::new(config.twelvedata_keys.clone())
            .with_timezone(dashboard_config.market_tz);
        Some(Arc::new(provider))
    };

    let event_bus = EventBus::new(256);
    let dashboard = Dashboard::new(
        dashboard_config,
        DashboardProviders { primary, secondary },
        store,
        Arc::new(SystemClock),
        Arc::new(event_bus.clone()),
    )?;

    Ok(AppState {
        dashboard: Arc::new(dashboard),
        event_bus,
    })
}

/// In-memory state for tests and dry runs.
#[cfg(test)]
pub fn build_memory_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
    Ok(Arc::new(build_state_with_store(
        config.dashboard(),
        config,
        store,
    )?))
}

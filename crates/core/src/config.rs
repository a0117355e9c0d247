//! Dashboard configuration: the tab table and the service tunables.

use std::collections::HashSet;
use std::time::Duration;

use chrono_tz::Tz;
use macrodash_market_data::InstrumentSpec;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::errors::{Error, Result};
use crate::utils::{SessionWindow, DEFAULT_MARKET_TZ};

/// What a tab renders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabKind {
    /// Instrument tiles backed by quotes, baselines and candles
    Macro,
    /// The weekly US economic calendar
    Calendar,
}

/// One dashboard tab.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabConfig {
    /// Tab id, also the credential scope for the tab's requests
    pub id: String,
    pub kind: TabKind,
    pub short_name: String,
    pub long_name: String,
    #[serde(default)]
    pub symbols: Vec<InstrumentSpec>,
}

impl TabConfig {
    pub fn macro_tab(
        id: &str,
        short_name: &str,
        long_name: &str,
        symbols: Vec<InstrumentSpec>,
    ) -> Self {
        Self {
            id: id.to_string(),
            kind: TabKind::Macro,
            short_name: short_name.to_string(),
            long_name: long_name.to_string(),
            symbols,
        }
    }

    pub fn calendar(id: &str, short_name: &str, long_name: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: TabKind::Calendar,
            short_name: short_name.to_string(),
            long_name: long_name.to_string(),
            symbols: Vec::new(),
        }
    }

    pub fn is_macro(&self) -> bool {
        self.kind == TabKind::Macro
    }

    /// Finds a symbol of this tab by ticker, case-insensitively.
    pub fn find_symbol(&self, symbol: &str) -> Option<&InstrumentSpec> {
        let wanted = symbol.trim();
        self.symbols
            .iter()
            .find(|s| s.symbol.eq_ignore_ascii_case(wanted))
    }
}

#[derive(Clone, Debug)]
pub struct QuoteServiceConfig {
    pub ttl: Duration,
    pub spark_max_points: usize,
    pub request_spacing: Duration,
    /// Spark points outside this window are dropped; `None` keeps every point.
    pub session: Option<SessionWindow>,
}

impl Default for QuoteServiceConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(QUOTE_TTL_MS as u64),
            spark_max_points: SPARK_MAX_POINTS,
            request_spacing: Duration::from_millis(REQUEST_SPACING_MS),
            session: Some(SessionWindow::default()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CandleServiceConfig {
    pub fine_stale: Duration,
    pub coarse_stale: Duration,
    pub fine_lookback_days: i64,
    pub coarse_lookback_days: i64,
    pub month_bucket_hours: u32,
    pub request_spacing: Duration,
}

impl Default for CandleServiceConfig {
    fn default() -> Self {
        Self {
            fine_stale: Duration::from_millis(CANDLE_FINE_STALE_MS as u64),
            coarse_stale: Duration::from_millis(CANDLE_COARSE_STALE_MS as u64),
            fine_lookback_days: CANDLE_FINE_LOOKBACK_DAYS,
            coarse_lookback_days: CANDLE_COARSE_LOOKBACK_DAYS,
            month_bucket_hours: MONTH_BUCKET_HOURS,
            request_spacing: Duration::from_millis(REQUEST_SPACING_MS),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BaselineServiceConfig {
    pub ttl: Duration,
    pub lookback_days: i64,
    pub min_closes: usize,
    pub request_spacing: Duration,
}

impl Default for BaselineServiceConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(BASELINE_TTL_MS as u64),
            lookback_days: BASELINE_LOOKBACK_DAYS,
            min_closes: BASELINE_MIN_CLOSES,
            request_spacing: Duration::from_millis(REQUEST_SPACING_MS),
        }
    }
}

#[derive(Clone, Debug)]
pub struct IntradayServiceConfig {
    pub ttl_day: Duration,
    pub ttl_week: Duration,
    pub ttl_month: Duration,
    pub request_spacing: Duration,
    pub session: SessionWindow,
}

impl Default for IntradayServiceConfig {
    fn default() -> Self {
        Self {
            ttl_day: Duration::from_secs(2 * 60),
            ttl_week: Duration::from_secs(10 * 60),
            ttl_month: Duration::from_secs(30 * 60),
            request_spacing: Duration::from_millis(REQUEST_SPACING_MS),
            session: SessionWindow::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub auto_refresh_interval: Duration,
    /// Activating a tab older than this triggers a refresh; `None` never does.
    pub stale_after_activation: Option<Duration>,
    /// Silently refresh the other tabs after the startup refresh.
    pub warm_other_tabs: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            auto_refresh_interval: Duration::from_secs(AUTO_REFRESH_SECS),
            stale_after_activation: None,
            warm_other_tabs: true,
        }
    }
}

/// Complete dashboard configuration.
#[derive(Clone, Debug)]
pub struct DashboardConfig {
    pub tabs: Vec<TabConfig>,
    pub market_tz: Tz,
    pub session: SessionWindow,
    pub quotes: QuoteServiceConfig,
    pub candles: CandleServiceConfig,
    pub baselines: BaselineServiceConfig,
    pub intraday: IntradayServiceConfig,
    pub orchestrator: OrchestratorConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            tabs: default_tabs(),
            market_tz: DEFAULT_MARKET_TZ,
            session: SessionWindow::default(),
            quotes: QuoteServiceConfig::default(),
            candles: CandleServiceConfig::default(),
            baselines: BaselineServiceConfig::default(),
            intraday: IntradayServiceConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl DashboardConfig {
    pub fn with_tabs(mut self, tabs: Vec<TabConfig>) -> Self {
        self.tabs = tabs;
        self
    }

    /// Sets the inter-request delay for every sequential service.
    pub fn with_request_spacing(mut self, spacing: Duration) -> Self {
        self.quotes.request_spacing = spacing;
        self.candles.request_spacing = spacing;
        self.baselines.request_spacing = spacing;
        self.intraday.request_spacing = spacing;
        self
    }

    /// Sets the session window used by spark and intraday filtering.
    pub fn with_session(mut self, session: SessionWindow) -> Self {
        self.session = session;
        if self.quotes.session.is_some() {
            self.quotes.session = Some(session);
        }
        self.intraday.session = session;
        self
    }

    pub fn tab(&self, id: &str) -> Option<&TabConfig> {
        self.tabs.iter().find(|t| t.id == id)
    }

    pub fn require_tab(&self, id: &str) -> Result<&TabConfig> {
        self.tab(id).ok_or_else(|| Error::UnknownTab(id.to_string()))
    }

    pub fn macro_tabs(&self) -> impl Iterator<Item = &TabConfig> {
        self.tabs.iter().filter(|t| t.is_macro())
    }

    pub fn first_tab_id(&self) -> Option<&str> {
        self.tabs.first().map(|t| t.id.as_str())
    }

    /// Rejects empty tab tables and duplicate tab ids.
    pub fn validate(&self) -> Result<()> {
        if self.tabs.is_empty() {
            return Err(Error::InvalidConfigValue("no tabs configured".to_string()));
        }
        let mut seen = HashSet::new();
        for tab in &self.tabs {
            if tab.id.trim().is_empty() {
                return Err(Error::InvalidConfigValue("tab id is empty".to_string()));
            }
            if !seen.insert(tab.id.as_str()) {
                return Err(Error::InvalidConfigValue(format!(
                    "duplicate tab id '{}'",
                    tab.id
                )));
            }
        }
        Ok(())
    }
}

/// The stock tab table.
pub fn default_tabs() -> Vec<TabConfig> {
    let equities = |symbols: &[&str]| -> Vec<InstrumentSpec> {
        symbols.iter().map(|s| InstrumentSpec::equity(s)).collect()
    };

    let mut rates = equities(&["SHY", "IEF", "TLT", "HYG", "LQD"]);
    rates.push(InstrumentSpec::equity("DXY").with_fallback("UUP"));

    vec![
        TabConfig::macro_tab(
            "global",
            "Global",
            "Global Markets",
            equities(&["SPY", "QQQ", "IEUR", "EWJ", "EWH", "XIC"]),
        ),
        TabConfig::macro_tab(
            "metals",
            "Metals",
            "Precious Metals",
            ["XAUUSD", "XAGUSD", "XPTUSD", "XPDUSD"]
                .iter()
                .map(|s| InstrumentSpec::synthetic_fx(s))
                .collect(),
        ),
        TabConfig::macro_tab(
            "commo",
            "Commo",
            "Commodities",
            equities(&["USO", "BNO", "UNG", "CPER"]),
        ),
        TabConfig::macro_tab("rates", "Rates", "Rates", rates),
        TabConfig::calendar("calendar", "Calendar", "Economic Calendar (US)"),
    ]
}

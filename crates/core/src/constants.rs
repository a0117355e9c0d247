//! Tunables shared across the caching services.

/// Quotes younger than this are served without a network call
pub const QUOTE_TTL_MS: i64 = 2 * 60 * 1000;

/// Maximum retained sparkline points per symbol
pub const SPARK_MAX_POINTS: usize = 40;

/// Delay between sequential provider calls within a tab
pub const REQUEST_SPACING_MS: u64 = 120;

/// Staleness of the fine-grained (1-minute) candle base
pub const CANDLE_FINE_STALE_MS: i64 = 150 * 1000;

/// Staleness of the coarse (1-hour) candle base
pub const CANDLE_COARSE_STALE_MS: i64 = 15 * 60 * 1000;

/// Lookback of the fine-grained candle base
pub const CANDLE_FINE_LOOKBACK_DAYS: i64 = 7;

/// Lookback of the coarse candle base
pub const CANDLE_COARSE_LOOKBACK_DAYS: i64 = 45;

/// Width of the 1M view aggregate buckets
pub const MONTH_BUCKET_HOURS: u32 = 4;

/// Trading days kept in the 1W view
pub const WEEK_TRADING_DAYS: usize = 5;

/// Trading days kept in the 1M view
pub const MONTH_TRADING_DAYS: usize = 21;

/// Baselines are refetched after this age
pub const BASELINE_TTL_MS: i64 = 12 * 60 * 60 * 1000;

/// Daily history requested for baselines
pub const BASELINE_LOOKBACK_DAYS: i64 = 90;

/// Closes needed before the secondary provider is skipped
pub const BASELINE_MIN_CLOSES: usize = 22;

/// Bars back from the latest close for the week baseline
pub const WEEK_OFFSET: usize = 6;

/// Bars back from the latest close for the month baseline
pub const MONTH_OFFSET: usize = 22;

/// Synthetic pair discovery table lifetime
pub const SYMBOL_MAP_TTL_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Auto-refresh period while visible
pub const AUTO_REFRESH_SECS: u64 = 5 * 60;

/// Activation staleness threshold when enabled
pub const STALE_AFTER_ACTIVATION_SECS: u64 = 30;

/// Pause after a failed discovery call before the next attempt
pub const DISCOVERY_RETRY_MS: i64 = 60 * 1000;

/// Key scope used for synthetic pair discovery
pub const DISCOVERY_SCOPE: &str = "metals";

/// Key scope used for the economic calendar
pub const CALENDAR_SCOPE: &str = "calendar";

/// Bars requested for the 1D intraday chart (1-minute, today only)
pub const INTRADAY_DAY_LIMIT: u32 = 800;

/// Bars requested for the 1W intraday chart (15-minute)
pub const INTRADAY_WEEK_LIMIT: u32 = 1200;

/// Bars requested for the 1M intraday chart (4-hour)
pub const INTRADAY_MONTH_LIMIT: u32 = 1500;

/// Trailing 1-minute bars fetched when today has no session yet
pub const INTRADAY_DAY_FALLBACK_LIMIT: u32 = 1200;

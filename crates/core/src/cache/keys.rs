//! Persistent cache key scheme.
//!
//! Every prefix carries a schema version; changing a layout means bumping
//! the version so old entries are simply ignored.

use macrodash_market_data::InstrumentSpec;

pub const QUOTES_PREFIX: &str = "macrodash:quotes:v2:";
pub const CANDLES_PREFIX: &str = "macrodash:candles:v1:";
pub const RANGES_PREFIX: &str = "macrodash:ranges:v2:";
pub const INTRADAY_PREFIX: &str = "macrodash:intraday:v1:";
pub const SYMBOL_MAP_KEY: &str = "macrodash:fx-map:v1";
pub const CALENDAR_KEY: &str = "macrodash:calendar:v1";

const META: &str = "__meta";

pub fn quote_record(tab: &str, spec: &InstrumentSpec) -> String {
    format!("{}{}:{}", QUOTES_PREFIX, tab, spec.symbol_key())
}

pub fn quote_meta(tab: &str) -> String {
    format!("{}{}:{}", QUOTES_PREFIX, tab, META)
}

pub fn candle_tier(tab: &str, cache_key: &str, tier: &str) -> String {
    format!("{}{}:{}:{}", CANDLES_PREFIX, tab, cache_key.to_uppercase(), tier)
}

pub fn candle_meta(tab: &str) -> String {
    format!("{}{}:{}", CANDLES_PREFIX, tab, META)
}

pub fn baseline(tab: &str, spec: &InstrumentSpec) -> String {
    format!("{}{}:{}", RANGES_PREFIX, tab, spec.symbol_key())
}

pub fn baseline_meta(tab: &str) -> String {
    format!("{}{}:{}", RANGES_PREFIX, tab, META)
}

pub fn intraday(tab: &str, symbol: &str, range: &str) -> String {
    format!(
        "{}{}:{}:{}",
        INTRADAY_PREFIX,
        tab,
        symbol.trim().to_uppercase(),
        range
    )
}

pub mod clock;
pub mod fallback;
pub mod inflight;
pub mod time_utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use fallback::{first_success, Attempts};
pub use inflight::InFlight;
pub use time_utils::{MarketTime, SessionWindow, ZonedParts, DEFAULT_MARKET_TZ};

//! Calendar fetch, scoring and weekly refresh boundary.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Days, NaiveDate, NaiveTime, Timelike, Weekday};
use log::{debug, info, warn};
use macrodash_market_data::{EconomicEvent, MarketDataProvider, RequestContext};

use super::model::{star_rating, CachedCalendar, CalendarDay, CalendarEntry, CalendarSnapshot, WEEKDAYS};
use crate::cache::{keys, TieredCache};
use crate::constants::CALENDAR_SCOPE;
use crate::errors::Result;
use crate::utils::{Clock, MarketTime};

/// Weekly rollover: Friday 18:00 market time.
const BOUNDARY_HOUR: u32 = 18;

/// Only releases with at least this many stars are kept.
const MIN_STARS: u8 = 2;

/// Monday and Friday of the week the calendar shows at `now_secs`.
///
/// From Friday 18:00 through Sunday the following week is shown.
pub fn week_range(now_secs: i64, time: &MarketTime) -> Option<(NaiveDate, NaiveDate)> {
    let local = time.local(now_secs)?;
    let today = local.date_naive();
    let rolled = match local.weekday() {
        Weekday::Fri if local.hour() >= BOUNDARY_HOUR => true,
        Weekday::Sat | Weekday::Sun => true,
        _ => false,
    };

    let reference = if rolled {
        let to_monday = 7 - u64::from(today.weekday().num_days_from_monday());
        today.checked_add_days(Days::new(to_monday))?
    } else {
        today
    };
    let monday = reference
        .checked_sub_days(Days::new(u64::from(reference.weekday().num_days_from_monday())))?;
    let friday = monday.checked_add_days(Days::new(4))?;
    Some((monday, friday))
}

/// Unix milliseconds of the latest Friday 18:00 at or before `now_ms`.
fn last_boundary_ms(now_ms: i64, time: &MarketTime) -> Option<i64> {
    let now_secs = now_ms.div_euclid(1000);
    let today = time.day(now_secs)?;
    let since_friday = (today.weekday().num_days_from_monday() + 3) % 7;
    let friday = today.checked_sub_days(Days::new(u64::from(since_friday)))?;
    let mut boundary = boundary_secs(friday, time)?;
    if boundary > now_secs {
        boundary = boundary_secs(friday.checked_sub_days(Days::new(7))?, time)?;
    }
    Some(boundary * 1000)
}

fn boundary_secs(friday: NaiveDate, time: &MarketTime) -> Option<i64> {
    let at = NaiveTime::from_hms_opt(BOUNDARY_HOUR, 0, 0)?;
    time.zoned_to_utc(friday.and_time(at))
}

/// Time left until the next Friday 18:00, never less than one second.
pub fn duration_until_next_boundary(now_ms: i64, time: &MarketTime) -> Duration {
    const WEEK_MS: i64 = 7 * 24 * 60 * 60 * 1000;
    let next = last_boundary_ms(now_ms, time)
        .and_then(|last| {
            // Step over DST shifts by recomputing from a point past the boundary
            last_boundary_ms(last + WEEK_MS + 60 * 60 * 1000, time)
        })
        .unwrap_or(now_ms + WEEK_MS);
    let wait = (next - now_ms).max(1000);
    Duration::from_millis(wait as u64)
}

/// Serves the weekly US calendar, refetching once per week or on demand.
pub struct CalendarService {
    provider: Arc<dyn MarketDataProvider>,
    cache: Arc<TieredCache>,
    clock: Arc<dyn Clock>,
    time: MarketTime,
}

impl CalendarService {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        cache: Arc<TieredCache>,
        clock: Arc<dyn Clock>,
        time: MarketTime,
    ) -> Self {
        Self {
            provider,
            cache,
            clock,
            time,
        }
    }

    /// Cached snapshot without touching the network.
    pub fn get_cached(&self) -> CalendarSnapshot {
        match self.cache.get::<CachedCalendar>(keys::CALENDAR_KEY) {
            Some(cached) => CalendarSnapshot {
                grouped: Some(cached.grouped),
                last_fetch_ms: Some(cached.last_fetch_ms),
                error: None,
            },
            None => CalendarSnapshot::default(),
        }
    }

    /// The current week's medium and high impact US releases.
    ///
    /// The cached snapshot is served until a Friday 18:00 boundary passes
    /// after it was fetched. A failed fetch returns the cached snapshot with
    /// the error message. Missing credentials are an error.
    pub async fn get_weekly_us(&self, force: bool) -> Result<CalendarSnapshot> {
        self.provider.ensure_credentials(CALENDAR_SCOPE)?;

        let cached: Option<CachedCalendar> = self.cache.get(keys::CALENDAR_KEY);
        let now_ms = self.clock.now_ms();
        if let Some(cached) = cached.as_ref() {
            if !force && !self.boundary_passed(cached.last_fetch_ms, now_ms) {
                debug!("Calendar is current, fetched at {}", cached.last_fetch_ms);
                return Ok(self.get_cached());
            }
        }

        let Some((monday, friday)) = week_range(now_ms.div_euclid(1000), &self.time) else {
            return Ok(self.with_error(cached, "could not compute the calendar week".to_string()));
        };
        let from = monday.format("%Y-%m-%d").to_string();
        let to = friday.format("%Y-%m-%d").to_string();

        let ctx = RequestContext::new(CALENDAR_SCOPE);
        match self.provider.get_economic_calendar(&ctx, &from, &to).await {
            Ok(events) => {
                let grouped = self.group(&events);
                let kept: usize = grouped.iter().map(|d| d.events.len()).sum();
                info!(
                    "Calendar {}..{}: {} of {} releases kept",
                    from,
                    to,
                    kept,
                    events.len()
                );
                let fresh = CachedCalendar {
                    last_fetch_ms: now_ms,
                    grouped,
                };
                self.cache.put(keys::CALENDAR_KEY, &fresh);
                Ok(CalendarSnapshot {
                    grouped: Some(fresh.grouped),
                    last_fetch_ms: Some(now_ms),
                    error: None,
                })
            }
            Err(e) => {
                warn!("Calendar fetch for {}..{} failed: {}", from, to, e);
                Ok(self.with_error(cached, e.to_string()))
            }
        }
    }

    pub fn reset_cache(&self) {
        self.cache.remove(keys::CALENDAR_KEY);
    }

    pub fn duration_until_next_boundary(&self) -> Duration {
        duration_until_next_boundary(self.clock.now_ms(), &self.time)
    }

    fn boundary_passed(&self, last_fetch_ms: i64, now_ms: i64) -> bool {
        if last_fetch_ms <= 0 {
            return true;
        }
        last_boundary_ms(now_ms, &self.time).is_some_and(|b| last_fetch_ms < b)
    }

    fn with_error(&self, cached: Option<CachedCalendar>, error: String) -> CalendarSnapshot {
        CalendarSnapshot {
            last_fetch_ms: cached.as_ref().map(|c| c.last_fetch_ms),
            grouped: cached.map(|c| c.grouped),
            error: Some(error),
        }
    }

    /// US releases of two stars or more, grouped Monday..Friday by time.
    fn group(&self, events: &[EconomicEvent]) -> Vec<CalendarDay> {
        let mut days: Vec<CalendarDay> = WEEKDAYS
            .iter()
            .map(|d| CalendarDay {
                weekday: d.to_string(),
                events: Vec::new(),
            })
            .collect();

        for event in events {
            if !event.country.trim().eq_ignore_ascii_case("US") {
                continue;
            }
            let stars = star_rating(&event.event, event.impact.as_deref());
            if stars < MIN_STARS {
                continue;
            }
            let Some(time_sec) = event
                .time
                .as_deref()
                .and_then(|t| self.time.parse_event_time(t))
            else {
                continue;
            };
            let Some(day) = self
                .time
                .weekday_name(time_sec)
                .and_then(|name| days.iter_mut().find(|d| d.weekday == name))
            else {
                continue;
            };
            day.events.push(CalendarEntry {
                time_sec,
                time_label: self.time.format_time(time_sec),
                event: event.event.clone(),
                stars,
            });
        }

        for day in &mut days {
            day.events.sort_by_key(|e| e.time_sec);
        }
        days
    }
}

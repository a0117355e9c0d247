use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Weekday,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Default market timezone.
/// Session windows, day keys and weekly boundaries are all evaluated here.
pub const DEFAULT_MARKET_TZ: Tz = chrono_tz::America::New_York;

/// Calendar fields of an instant in the market timezone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZonedParts {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub weekday: Weekday,
}

/// Zone-aware date arithmetic for one fixed market timezone.
///
/// All timestamps are Unix seconds (UTC). Conversions that cannot be
/// represented return `None` rather than panicking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarketTime {
    tz: Tz,
}

impl Default for MarketTime {
    fn default() -> Self {
        Self::new(DEFAULT_MARKET_TZ)
    }
}

impl MarketTime {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// The instant as a zoned datetime.
    pub fn local(&self, unix_secs: i64) -> Option<DateTime<Tz>> {
        DateTime::from_timestamp(unix_secs, 0).map(|dt| dt.with_timezone(&self.tz))
    }

    pub fn parts(&self, unix_secs: i64) -> Option<ZonedParts> {
        self.local(unix_secs).map(|dt| ZonedParts {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
            weekday: dt.weekday(),
        })
    }

    /// Market-local calendar day of the instant.
    pub fn day(&self, unix_secs: i64) -> Option<NaiveDate> {
        self.local(unix_secs).map(|dt| dt.date_naive())
    }

    /// `YYYY-MM-DD` key of the market-local day.
    pub fn day_key(&self, unix_secs: i64) -> Option<String> {
        self.day(unix_secs).map(|d| d.format("%Y-%m-%d").to_string())
    }

    pub fn is_weekend(&self, unix_secs: i64) -> bool {
        self.local(unix_secs)
            .map(|dt| matches!(dt.weekday(), Weekday::Sat | Weekday::Sun))
            .unwrap_or(false)
    }

    /// Converts market-local wall-clock time to Unix seconds.
    ///
    /// Ambiguous times (DST fall-back) resolve to the earlier instant. Times
    /// inside a DST gap are shifted forward by the gap.
    pub fn zoned_to_utc(&self, naive: NaiveDateTime) -> Option<i64> {
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| {
                self.tz
                    .from_local_datetime(&(naive + Duration::hours(1)))
                    .earliest()
            })
            .map(|dt| dt.timestamp())
    }

    /// Unix seconds of local midnight on `date`.
    pub fn start_of_day(&self, date: NaiveDate) -> Option<i64> {
        self.zoned_to_utc(date.and_hms_opt(0, 0, 0)?)
    }

    /// Start of the local `hours`-wide bucket containing the instant, with
    /// boundaries aligned to local midnight.
    pub fn bucket_start(&self, unix_secs: i64, hours: u32) -> Option<i64> {
        let hours = hours.max(1);
        let local = self.local(unix_secs)?;
        let bucket_hour = (local.hour() / hours) * hours;
        let naive = local.date_naive().and_hms_opt(bucket_hour, 0, 0)?;
        self.zoned_to_utc(naive)
    }

    /// Local time label, e.g. "08:30 AM".
    pub fn format_time(&self, unix_secs: i64) -> String {
        self.local(unix_secs)
            .map(|dt| dt.format("%I:%M %p").to_string())
            .unwrap_or_default()
    }

    /// Full English weekday name of the local day, e.g. "Monday".
    pub fn weekday_name(&self, unix_secs: i64) -> Option<&'static str> {
        self.local(unix_secs).map(|dt| weekday_name(dt.weekday()))
    }

    /// Parses an economic calendar time.
    ///
    /// Accepts Unix seconds, `YYYY-MM-DD HH:MM[:SS]` (read as market-local wall
    /// clock) and RFC 3339.
    pub fn parse_event_time(&self, raw: &str) -> Option<i64> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(secs) = raw.parse::<i64>() {
            return Some(secs);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.timestamp());
        }

        // Drop sub-second or zone suffixes after the seconds field
        let head: String = raw.chars().take(19).collect();
        let head = head.replace('T', " ");
        let naive = NaiveDateTime::parse_from_str(&head, "%Y-%m-%d %H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(head.trim(), "%Y-%m-%d %H:%M"))
            .ok()?;
        self.zoned_to_utc(naive)
    }
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Daily trading-session window in market-local time, inclusive at both
/// ends to the minute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Default for SessionWindow {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(16, 30, 0).unwrap_or_default(),
        }
    }
}

impl SessionWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Whether the instant falls on a weekday inside the window.
    pub fn contains(&self, time: &MarketTime, unix_secs: i64) -> bool {
        let Some(local) = time.local(unix_secs) else {
            return false;
        };
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let minutes = local.hour() * 60 + local.minute();
        let start = self.start.hour() * 60 + self.start.minute();
        let end = self.end.hour() * 60 + self.end.minute();
        minutes >= start && minutes <= end
    }
}

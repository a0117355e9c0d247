use serde::{Deserialize, Serialize};

/// Days the calendar groups events under, in display order.
pub const WEEKDAYS: [&str; 5] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"];

/// Release names rated three stars when the provider gives no impact.
const THREE_STAR_TERMS: &[&str] = &[
    "fomc",
    "fed rate",
    "interest rate decision",
    "cpi",
    "pce",
    "nonfarm",
    "nfp",
    "average hourly",
    "ism",
];

const TWO_STAR_TERMS: &[&str] = &[
    "jobless",
    "initial claims",
    "continuing claims",
    "jolts",
    "retail sales",
    "adp",
    "ppi",
    "consumer confidence",
    "michigan",
    "housing starts",
    "building permits",
];

/// One release as shown in the calendar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEntry {
    pub time_sec: i64,
    /// Market-local time, e.g. "08:30 AM"
    pub time_label: String,
    pub event: String,
    pub stars: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub weekday: String,
    pub events: Vec<CalendarEntry>,
}

/// What the calendar view renders.
///
/// `grouped` is `None` only when nothing was ever fetched. `error` carries
/// the last failure while older data keeps being served.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSnapshot {
    pub grouped: Option<Vec<CalendarDay>>,
    pub last_fetch_ms: Option<i64>,
    pub error: Option<String>,
}

/// Persisted form of a successful fetch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CachedCalendar {
    pub last_fetch_ms: i64,
    pub grouped: Vec<CalendarDay>,
}

/// Importance from 1 to 3 stars.
///
/// The provider's impact rating wins; otherwise the release name is matched
/// against a short list of market-moving releases.
pub fn star_rating(event: &str, impact: Option<&str>) -> u8 {
    match impact.map(|i| i.trim().to_lowercase()).as_deref() {
        Some("high") => return 3,
        Some("medium") => return 2,
        Some("low") => return 1,
        _ => {}
    }

    let name = event.to_lowercase();
    let has = |term: &&str| name.contains(*term);
    let unemployment_rate = name.contains("unemployment") && name.contains("rate");
    let early_gdp = name.contains("gdp")
        && (name.contains("advance") || name.contains("prelim"));

    if THREE_STAR_TERMS.iter().any(has) || unemployment_rate || early_gdp {
        3
    } else if TWO_STAR_TERMS.iter().any(has) {
        2
    } else {
        1
    }
}

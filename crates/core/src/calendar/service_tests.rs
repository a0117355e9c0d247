use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use macrodash_market_data::EconomicEvent;

use super::{duration_until_next_boundary, week_range, CalendarService};
use crate::cache::keys;
use crate::test_support::{clock_at, memory_cache, ny_secs, Failure, MockProvider};
use crate::utils::{ManualClock, MarketTime};

fn event(country: &str, name: &str, time: &str, impact: Option<&str>) -> EconomicEvent {
    EconomicEvent {
        country: country.to_string(),
        event: name.to_string(),
        impact: impact.map(str::to_string),
        time: Some(time.to_string()),
        actual: None,
        estimate: None,
        prev: None,
        unit: None,
    }
}

fn week_events() -> Vec<EconomicEvent> {
    vec![
        event("US", "Initial Jobless Claims", "2024-01-11 08:30:00", None),
        event("US", "CPI YoY", "2024-01-11 08:30:00", None),
        event("US", "Retail Sales MoM", "2024-01-11 07:00:00", None),
        event("US", "FOMC Minutes", "2024-01-10 14:00:00", Some("high")),
        event("US", "Baker Hughes Oil Rig Count", "2024-01-12 13:00:00", None),
        event("GB", "GDP Growth Rate MoM Prelim", "2024-01-12 02:00:00", None),
        event("US", "ISM Services PMI", "2024-01-13 10:00:00", None),
        event("US", "PPI MoM", "", None),
    ]
}

struct Fixture {
    provider: Arc<MockProvider>,
    clock: Arc<ManualClock>,
    service: CalendarService,
}

/// Wednesday 2024-01-10 12:00 New York.
fn fixture() -> Fixture {
    let provider = Arc::new(MockProvider::new("CALENDAR"));
    let (_, cache) = memory_cache();
    let clock = clock_at(2024, 1, 10, 12, 0);
    let service = CalendarService::new(
        provider.clone(),
        cache,
        clock.clone(),
        MarketTime::default(),
    );
    Fixture {
        provider,
        clock,
        service,
    }
}

#[tokio::test]
async fn test_weekly_us_groups_and_filters() {
    let f = fixture();
    f.provider.events(week_events());

    let snap = f.service.get_weekly_us(false).await.unwrap();
    assert_eq!(f.provider.calls(), vec!["calendar:2024-01-08:2024-01-12"]);
    assert!(snap.error.is_none());
    assert_eq!(snap.last_fetch_ms, Some(ny_secs(2024, 1, 10, 12, 0) * 1000));

    let grouped = snap.grouped.unwrap();
    let names: Vec<&str> = grouped.iter().map(|d| d.weekday.as_str()).collect();
    assert_eq!(names, vec!["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"]);

    assert_eq!(grouped[2].events.len(), 1);
    assert_eq!(grouped[2].events[0].stars, 3);

    let thursday: Vec<(&str, u8)> = grouped[3]
        .events
        .iter()
        .map(|e| (e.event.as_str(), e.stars))
        .collect();
    assert_eq!(
        thursday,
        vec![
            ("Retail Sales MoM", 2),
            ("Initial Jobless Claims", 2),
            ("CPI YoY", 3)
        ]
    );
    assert_eq!(grouped[3].events[0].time_label, "07:00 AM");
    assert!(grouped[4].events.is_empty());
}

#[tokio::test]
async fn test_snapshot_is_reused_until_friday_evening() {
    let f = fixture();
    f.provider.events(week_events());
    f.service.get_weekly_us(false).await.unwrap();

    f.clock.set_ms(ny_secs(2024, 1, 12, 17, 59) * 1000);
    f.service.get_weekly_us(false).await.unwrap();
    assert_eq!(f.provider.count("calendar"), 1);

    f.clock.set_ms(ny_secs(2024, 1, 12, 18, 30) * 1000);
    f.service.get_weekly_us(false).await.unwrap();
    assert_eq!(
        f.provider.calls(),
        vec!["calendar:2024-01-08:2024-01-12", "calendar:2024-01-15:2024-01-19"]
    );

    f.service.get_weekly_us(true).await.unwrap();
    assert_eq!(f.provider.count("calendar"), 3);
}

#[tokio::test]
async fn test_failure_keeps_stale_snapshot() {
    let f = fixture();
    f.provider.events(week_events());
    let first = f.service.get_weekly_us(false).await.unwrap();

    f.provider.fail_calendar(Failure::Forbidden);
    let snap = f.service.get_weekly_us(true).await.unwrap();
    assert_eq!(snap.grouped, first.grouped);
    assert_eq!(snap.last_fetch_ms, first.last_fetch_ms);
    assert!(snap.error.unwrap().contains("access"));
}

#[tokio::test]
async fn test_failure_without_cache_has_no_groups() {
    let f = fixture();
    f.provider.fail_calendar(Failure::Server);
    let snap = f.service.get_weekly_us(false).await.unwrap();
    assert!(snap.grouped.is_none());
    assert!(snap.last_fetch_ms.is_none());
    assert!(snap.error.is_some());
}

#[tokio::test]
async fn test_reset_cache_forces_refetch() {
    let f = fixture();
    f.provider.events(week_events());
    f.service.get_weekly_us(false).await.unwrap();
    f.service.reset_cache();
    assert_eq!(f.service.get_cached().grouped, None);

    f.service.get_weekly_us(false).await.unwrap();
    assert_eq!(f.provider.count("calendar"), 2);
    assert!(f.service.get_cached().grouped.is_some());
}

#[tokio::test]
async fn test_missing_calendar_key_is_an_error() {
    let provider = Arc::new(MockProvider::new("CALENDAR").with_scopes(&["global"]));
    let (_, cache) = memory_cache();
    let service = CalendarService::new(
        provider.clone(),
        cache.clone(),
        clock_at(2024, 1, 10, 12, 0),
        MarketTime::default(),
    );
    assert!(service.get_weekly_us(false).await.is_err());
    assert!(provider.calls().is_empty());
    assert!(cache.get_value(keys::CALENDAR_KEY).is_none());
}

#[test]
fn test_week_range_rolls_over_after_friday_close() {
    let ny = MarketTime::default();
    let date = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();

    let wed = week_range(ny_secs(2024, 1, 10, 12, 0), &ny).unwrap();
    assert_eq!(wed, (date(8), date(12)));

    let fri_early = week_range(ny_secs(2024, 1, 12, 17, 0), &ny).unwrap();
    assert_eq!(fri_early, (date(8), date(12)));

    let fri_late = week_range(ny_secs(2024, 1, 12, 18, 0), &ny).unwrap();
    assert_eq!(fri_late, (date(15), date(19)));

    let sunday = week_range(ny_secs(2024, 1, 14, 9, 0), &ny).unwrap();
    assert_eq!(sunday, (date(15), date(19)));
}

#[test]
fn test_duration_until_next_boundary() {
    let ny = MarketTime::default();
    let hours = |h: u64| Duration::from_secs(h * 60 * 60);

    let wed = ny_secs(2024, 1, 10, 12, 0) * 1000;
    assert_eq!(duration_until_next_boundary(wed, &ny), hours(54));

    let fri = ny_secs(2024, 1, 12, 18, 0) * 1000;
    assert_eq!(duration_until_next_boundary(fri, &ny), hours(7 * 24));

    // Clocks spring forward on 2024-03-10
    let before_dst = ny_secs(2024, 3, 8, 19, 0) * 1000;
    assert_eq!(duration_until_next_boundary(before_dst, &ny), hours(6 * 24 + 22));
}

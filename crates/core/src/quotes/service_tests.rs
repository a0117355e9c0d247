//! Tests for QuoteService.
//!
//! # Critical Contract Points
//!
//! 1. A fresh record is served without any provider call
//! 2. Concurrent refreshes of one symbol share a single fetch
//! 3. Zero/placeholder quotes count as failures and trigger the fallback
//! 4. Total failure leaves the existing record untouched

use std::sync::Arc;
use std::time::Duration;

use macrodash_market_data::{InstrumentSpec, ProviderQuote, Resolution};

use super::QuoteService;
use crate::baselines::BaselineService;
use crate::config::{BaselineServiceConfig, QuoteServiceConfig};
use crate::symbols::SymbolResolver;
use crate::test_support::{clock_at, memory_cache, ny_secs, Failure, MockProvider};
use crate::timeframe::Timeframe;
use crate::utils::{ManualClock, MarketTime};

struct Fixture {
    provider: Arc<MockProvider>,
    clock: Arc<ManualClock>,
    baselines: Arc<BaselineService>,
    service: QuoteService,
}

fn fixture_with(provider: MockProvider) -> Fixture {
    let provider = Arc::new(provider);
    let (_, cache) = memory_cache();
    let clock = clock_at(2024, 1, 5, 10, 0);
    let resolver = Arc::new(SymbolResolver::new(
        provider.clone(),
        cache.clone(),
        clock.clone(),
    ));
    let baselines = Arc::new(BaselineService::new(
        provider.clone(),
        resolver.clone(),
        cache.clone(),
        clock.clone(),
        BaselineServiceConfig {
            request_spacing: Duration::ZERO,
            ..Default::default()
        },
    ));
    let config = QuoteServiceConfig {
        request_spacing: Duration::ZERO,
        ..Default::default()
    };
    let service = QuoteService::new(
        provider.clone(),
        resolver,
        baselines.clone(),
        cache,
        clock.clone(),
        MarketTime::default(),
        config,
    );
    Fixture {
        provider,
        clock,
        baselines,
        service,
    }
}

fn fixture() -> Fixture {
    fixture_with(MockProvider::new("MOCK"))
}

#[tokio::test]
async fn test_fresh_record_skips_network() {
    let f = fixture();
    f.provider.quote("SPY", 470.0);
    let spy = InstrumentSpec::equity("SPY");

    assert!(f.service.ensure_fresh_symbol("global", &spy, false).await.unwrap());
    f.provider.reset_calls();

    f.clock.advance(Duration::from_secs(60));
    assert!(!f.service.ensure_fresh_symbol("global", &spy, false).await.unwrap());
    assert!(f.provider.calls().is_empty());

    // Past the TTL the quote is fetched again
    f.clock.advance(Duration::from_secs(61));
    assert!(f.service.ensure_fresh_symbol("global", &spy, false).await.unwrap());
    assert_eq!(f.provider.count("quote:SPY"), 1);
}

#[tokio::test]
async fn test_concurrent_forced_refreshes_share_one_fetch() {
    let f = fixture();
    f.provider.quote("QQQ", 400.0);
    let qqq = InstrumentSpec::equity("QQQ");

    let (a, b) = tokio::join!(
        f.service.ensure_fresh_symbol("global", &qqq, true),
        f.service.ensure_fresh_symbol("global", &qqq, true),
    );
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(f.provider.count("quote:QQQ"), 1);
}

#[tokio::test]
async fn test_same_symbol_in_other_tab_is_not_coalesced() {
    let f = fixture();
    f.provider.quote("SPY", 470.0);
    let spy = InstrumentSpec::equity("SPY");

    let (a, b) = tokio::join!(
        f.service.ensure_fresh_symbol("global", &spy, true),
        f.service.ensure_fresh_symbol("rates", &spy, true),
    );
    assert!(a.unwrap() && b.unwrap());
    assert_eq!(f.provider.count("quote:SPY"), 2);
}

#[tokio::test]
async fn test_zero_price_is_a_failure() {
    let f = fixture();
    let bad = InstrumentSpec::equity("BADSYM");

    f.provider.quote("BADSYM", 12.0);
    f.service.ensure_fresh_symbol("global", &bad, true).await.unwrap();
    let before = f.service.get_record("global", &bad).unwrap();

    f.provider.quote("BADSYM", 0.0);
    f.clock.advance(Duration::from_secs(600));
    let changed = f.service.ensure_fresh_symbol("global", &bad, false).await.unwrap();
    assert!(!changed);
    assert_eq!(f.service.get_record("global", &bad).unwrap(), before);
}

#[tokio::test]
async fn test_fallback_symbol_is_used_when_primary_fails() {
    let f = fixture();
    f.provider.fail_quote("DXY", Failure::Forbidden);
    f.provider.quote("UUP", 28.5);
    let dxy = InstrumentSpec::equity("DXY").with_fallback("UUP");

    assert!(f.service.ensure_fresh_symbol("rates", &dxy, false).await.unwrap());
    let record = f.service.get_record("rates", &dxy).unwrap();
    assert_eq!(record.resolved_symbol, "UUP");
    assert_eq!(record.symbol, "DXY");
    assert_eq!(record.last, 28.5);
    assert_eq!(f.provider.calls(), vec!["quote:DXY", "quote:UUP"]);
}

#[tokio::test]
async fn test_placeholder_primary_falls_back() {
    let f = fixture();
    f.provider.quote("DXY", 0.0);
    f.provider.quote("UUP", 28.5);
    let dxy = InstrumentSpec::equity("DXY").with_fallback("UUP");

    assert!(f.service.ensure_fresh_symbol("rates", &dxy, false).await.unwrap());
    assert_eq!(
        f.service.get_record("rates", &dxy).unwrap().resolved_symbol,
        "UUP"
    );
}

#[tokio::test]
async fn test_updated_at_strictly_increases() {
    let f = fixture();
    f.provider.quote("SPY", 470.0);
    let spy = InstrumentSpec::equity("SPY");

    let mut previous = 0;
    for price in [470.0, 471.0, 472.0] {
        f.provider.quote("SPY", price);
        // Same clock reading for every write
        f.service.ensure_fresh_symbol("global", &spy, true).await.unwrap();
        let record = f.service.get_record("global", &spy).unwrap();
        assert!(record.updated_at_ms > previous);
        previous = record.updated_at_ms;
    }

    let record = f.service.get_record("global", &spy).unwrap();
    assert_eq!(record.spark.len(), 3);
    assert!(record.spark.windows(2).all(|w| w[0].t_ms < w[1].t_ms));
    assert_eq!(f.service.get_tab_last_updated_ms("global"), Some(previous));
}

#[tokio::test]
async fn test_prefetch_continues_past_failures() {
    let f = fixture();
    f.provider.quote("SPY", 470.0);
    f.provider.fail_quote("QQQ", Failure::Server);
    f.provider.quote("EWJ", 68.0);
    let specs = vec![
        InstrumentSpec::equity("SPY"),
        InstrumentSpec::equity("QQQ"),
        InstrumentSpec::equity("EWJ"),
    ];

    let changed = f.service.prefetch_tab("global", &specs, false).await.unwrap();
    assert_eq!(changed, 2);
    assert_eq!(
        f.provider.calls(),
        vec!["quote:SPY", "quote:QQQ", "quote:EWJ"]
    );
}

#[tokio::test]
async fn test_missing_tab_key_is_an_error() {
    let f = fixture_with(MockProvider::new("MOCK").with_scopes(&["global"]));
    let tlt = InstrumentSpec::equity("TLT");
    assert!(f.service.ensure_fresh_symbol("rates", &tlt, false).await.is_err());
    assert!(f.provider.calls().is_empty());
}

#[tokio::test]
async fn test_snapshot_without_record_is_empty() {
    let f = fixture();
    let snap = f
        .service
        .get_snapshot("global", &InstrumentSpec::equity("EWH"), Timeframe::OneDay);
    assert_eq!(snap.last, None);
    assert_eq!(snap.change_pct, None);
    assert!(snap.spark.is_empty());
    assert_eq!(snap.logo_ref.as_deref(), Some("/icons/symbols/EWH.png"));
}

#[tokio::test]
async fn test_snapshot_change_by_timeframe() {
    let f = fixture();
    let spy = InstrumentSpec::equity("SPY");
    f.provider.quote_with(
        "SPY",
        ProviderQuote::new(110.0, "MOCK").with_percent_change(0.8),
    );
    f.service.ensure_fresh_symbol("global", &spy, false).await.unwrap();

    let day = f.service.get_snapshot("global", &spy, Timeframe::OneDay);
    assert_eq!(day.last, Some(110.0));
    assert_eq!(day.change_pct, Some(0.8));

    // No baselines yet
    let week = f.service.get_snapshot("global", &spy, Timeframe::OneWeek);
    assert_eq!(week.change_pct, None);

    // 30 daily closes: 1..=30, the week baseline is 25.0
    let last_close = ny_secs(2024, 1, 4, 16, 0);
    let bars = (0..30)
        .map(|i| {
            let c = (i + 1) as f64;
            macrodash_market_data::Bar::new(last_close - (29 - i) * 86_400, c, c, c, c)
        })
        .collect();
    f.provider.candles("SPY", Resolution::Daily, bars);
    f.baselines
        .ensure_baselines_for_tab("global", std::slice::from_ref(&spy), false)
        .await
        .unwrap();

    let week = f.service.get_snapshot("global", &spy, Timeframe::OneWeek);
    let pct = week.change_pct.unwrap();
    assert!((pct - 340.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_synthetic_quote_uses_resolved_symbol() {
    let f = fixture();
    f.provider.pairs(vec![macrodash_market_data::SyntheticPair::new(
        "XAU/USD",
        "OANDA:XAU_USD",
    )]);
    f.provider.quote("OANDA:XAU_USD", 2050.0);
    let gold = InstrumentSpec::synthetic_fx("XAUUSD");

    assert!(f.service.ensure_fresh_symbol("metals", &gold, false).await.unwrap());
    let record = f.service.get_record("metals", &gold).unwrap();
    assert_eq!(record.resolved_symbol, "OANDA:XAU_USD");
    assert_eq!(f.provider.calls(), vec!["discover", "quote:OANDA:XAU_USD"]);
}

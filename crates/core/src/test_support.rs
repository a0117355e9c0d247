//! Shared doubles for the in-crate service tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone};
use macrodash_market_data::{
    Bar, CandleRequest, EconomicEvent, InstrumentKind, MarketDataError, MarketDataProvider,
    ProviderCapabilities, ProviderQuote, RequestContext, Resolution, SeriesResponse,
    SyntheticPair,
};

use crate::cache::{MemoryCacheStore, TieredCache};
use crate::utils::{ManualClock, DEFAULT_MARKET_TZ};

/// Failure a mock call should produce.
#[derive(Clone, Copy, Debug)]
pub enum Failure {
    NotFound,
    Forbidden,
    RateLimited,
    Server,
}

impl Failure {
    fn into_error(self, symbol: &str) -> MarketDataError {
        match self {
            Self::NotFound => MarketDataError::SymbolNotFound(symbol.to_string()),
            Self::Forbidden => MarketDataError::AccessRestricted {
                provider: "MOCK".to_string(),
                message: "You don't have access to this resource.".to_string(),
            },
            Self::RateLimited => MarketDataError::RateLimited {
                provider: "MOCK".to_string(),
            },
            Self::Server => MarketDataError::ProviderError {
                provider: "MOCK".to_string(),
                message: "HTTP 502".to_string(),
            },
        }
    }
}

#[derive(Clone)]
enum Scripted<T> {
    Ok(T),
    Fail(Failure),
}

/// Scripted provider that records every call.
pub struct MockProvider {
    id: &'static str,
    scopes: Option<HashSet<String>>,
    capabilities: ProviderCapabilities,
    quotes: Mutex<HashMap<String, Scripted<ProviderQuote>>>,
    candles: Mutex<HashMap<(String, Resolution), Scripted<Vec<Bar>>>>,
    pairs: Mutex<Scripted<Vec<SyntheticPair>>>,
    calendar: Mutex<Scripted<Vec<EconomicEvent>>>,
    calls: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            scopes: None,
            capabilities: ProviderCapabilities {
                supports_quotes: true,
                supports_candles: true,
                supports_pair_discovery: true,
                supports_calendar: true,
                supports_today_only: true,
            },
            quotes: Mutex::new(HashMap::new()),
            candles: Mutex::new(HashMap::new()),
            pairs: Mutex::new(Scripted::Ok(Vec::new())),
            calendar: Mutex::new(Scripted::Ok(Vec::new())),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Only these credential scopes are configured.
    pub fn with_scopes(mut self, scopes: &[&str]) -> Self {
        self.scopes = Some(scopes.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn quote(&self, symbol: &str, price: f64) {
        self.quote_with(symbol, ProviderQuote::new(price, self.id));
    }

    pub fn quote_with(&self, symbol: &str, quote: ProviderQuote) {
        self.quotes
            .lock()
            .unwrap()
            .insert(symbol.to_string(), Scripted::Ok(quote));
    }

    pub fn fail_quote(&self, symbol: &str, failure: Failure) {
        self.quotes
            .lock()
            .unwrap()
            .insert(symbol.to_string(), Scripted::Fail(failure));
    }

    pub fn candles(&self, symbol: &str, resolution: Resolution, bars: Vec<Bar>) {
        self.candles
            .lock()
            .unwrap()
            .insert((symbol.to_string(), resolution), Scripted::Ok(bars));
    }

    pub fn fail_candles(&self, symbol: &str, resolution: Resolution, failure: Failure) {
        self.candles
            .lock()
            .unwrap()
            .insert((symbol.to_string(), resolution), Scripted::Fail(failure));
    }

    pub fn pairs(&self, pairs: Vec<SyntheticPair>) {
        *self.pairs.lock().unwrap() = Scripted::Ok(pairs);
    }

    pub fn fail_pairs(&self, failure: Failure) {
        *self.pairs.lock().unwrap() = Scripted::Fail(failure);
    }

    pub fn events(&self, events: Vec<EconomicEvent>) {
        *self.calendar.lock().unwrap() = Scripted::Ok(events);
    }

    pub fn fail_calendar(&self, failure: Failure) {
        *self.calendar.lock().unwrap() = Scripted::Fail(failure);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities.clone()
    }

    fn ensure_credentials(&self, scope: &str) -> Result<(), MarketDataError> {
        match &self.scopes {
            Some(scopes) if !scopes.contains(scope) => Err(MarketDataError::MissingApiKey {
                provider: self.id.to_string(),
                scope: scope.to_string(),
            }),
            _ => Ok(()),
        }
    }

    async fn get_quote(
        &self,
        ctx: &RequestContext,
        symbol: &str,
        _kind: InstrumentKind,
    ) -> Result<ProviderQuote, MarketDataError> {
        self.record(format!("quote:{}", symbol));
        // Let concurrent callers interleave like a real network call
        tokio::task::yield_now().await;
        if ctx.is_cancelled() {
            return Err(MarketDataError::Cancelled);
        }
        let scripted = self.quotes.lock().unwrap().get(symbol).cloned();
        match scripted {
            Some(Scripted::Ok(quote)) if quote.has_usable_price() => Ok(quote),
            Some(Scripted::Ok(_)) => Err(MarketDataError::InvalidData {
                provider: self.id.to_string(),
                message: format!("Placeholder quote for {}", symbol),
            }),
            Some(Scripted::Fail(failure)) => Err(failure.into_error(symbol)),
            None => Err(MarketDataError::SymbolNotFound(symbol.to_string())),
        }
    }

    async fn get_candles(
        &self,
        ctx: &RequestContext,
        request: &CandleRequest,
    ) -> Result<SeriesResponse, MarketDataError> {
        self.record(format!(
            "candles:{}:{}{}",
            request.symbol,
            request.resolution.twelve_data_interval(),
            if request.today_only { ":today" } else { "" }
        ));
        tokio::task::yield_now().await;
        if ctx.is_cancelled() {
            return Err(MarketDataError::Cancelled);
        }
        let scripted = self
            .candles
            .lock()
            .unwrap()
            .get(&(request.symbol.clone(), request.resolution))
            .cloned();
        match scripted {
            Some(Scripted::Ok(bars)) => {
                let bars = bars
                    .into_iter()
                    .filter(|b| b.timestamp >= request.from && b.timestamp <= request.to)
                    .collect();
                Ok(SeriesResponse::from_bars(bars))
            }
            Some(Scripted::Fail(failure)) => Err(failure.into_error(&request.symbol)),
            None => Ok(SeriesResponse::NoData),
        }
    }

    async fn discover_synthetic_pairs(
        &self,
        _ctx: &RequestContext,
    ) -> Result<Vec<SyntheticPair>, MarketDataError> {
        self.record("discover".to_string());
        tokio::task::yield_now().await;
        match self.pairs.lock().unwrap().clone() {
            Scripted::Ok(pairs) => Ok(pairs),
            Scripted::Fail(failure) => Err(failure.into_error("pairs")),
        }
    }

    async fn get_economic_calendar(
        &self,
        _ctx: &RequestContext,
        from: &str,
        to: &str,
    ) -> Result<Vec<EconomicEvent>, MarketDataError> {
        self.record(format!("calendar:{}:{}", from, to));
        tokio::task::yield_now().await;
        match self.calendar.lock().unwrap().clone() {
            Scripted::Ok(events) => Ok(events),
            Scripted::Fail(failure) => Err(failure.into_error("calendar")),
        }
    }
}

pub fn memory_cache() -> (Arc<MemoryCacheStore>, Arc<TieredCache>) {
    let store = Arc::new(MemoryCacheStore::new());
    let cache = Arc::new(TieredCache::new(store.clone()));
    (store, cache)
}

/// Unix seconds of a New York wall-clock time.
pub fn ny_secs(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> i64 {
    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap();
    DEFAULT_MARKET_TZ
        .from_local_datetime(&naive)
        .earliest()
        .unwrap()
        .timestamp()
}

/// Manual clock set to a New York wall-clock time.
pub fn clock_at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        ny_secs(year, month, day, hour, minute) * 1000,
    ))
}

/// One flat bar per step between two New York times.
pub fn bars_between(from: i64, to: i64, step_secs: i64, price: f64) -> Vec<Bar> {
    (0..)
        .map(|i| from + i * step_secs)
        .take_while(|t| *t <= to)
        .map(|t| Bar::new(t, price, price, price, price))
        .collect()
}

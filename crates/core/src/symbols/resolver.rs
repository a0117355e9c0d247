//! Maps instrument specs to provider-native identifiers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use macrodash_market_data::{
    InstrumentSpec, MarketDataProvider, ProviderSymbol, RequestContext,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::cache::{keys, TieredCache};
use crate::constants::{DISCOVERY_RETRY_MS, DISCOVERY_SCOPE, SYMBOL_MAP_TTL_MS};
use crate::errors::Result;
use crate::utils::Clock;

/// Persisted discovery table: compact pair code -> provider-native id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolMapSnapshot {
    pub fetched_at_ms: i64,
    pub map: BTreeMap<String, String>,
}

/// A spec paired with the identifier that should be sent upstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedSpec {
    pub spec: InstrumentSpec,
    /// Provider-native identifier (the spec's own symbol when unresolved)
    pub provider_symbol: ProviderSymbol,
    /// False when a synthetic pair was not found in the discovery table
    pub resolved: bool,
}

impl ResolvedSpec {
    fn identity(spec: &InstrumentSpec) -> Self {
        Self {
            provider_symbol: spec.symbol.clone(),
            spec: spec.clone(),
            resolved: true,
        }
    }
}

/// Resolves synthetic pairs through a long-lived, persisted discovery table.
///
/// Equities resolve to themselves. The table is rebuilt wholesale when it is
/// older than its TTL or on [`force_refresh`](Self::force_refresh); it is
/// never partially invalidated. Concurrent misses trigger one discovery call,
/// and a failed call is not repeated for a short back-off period. A provider
/// without pair discovery leaves every pair unresolved.
pub struct SymbolResolver {
    provider: Arc<dyn MarketDataProvider>,
    cache: Arc<TieredCache>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    retry_after: Duration,
    scope: String,
    rebuild: Mutex<()>,
    /// When the last discovery call failed; 0 when it succeeded
    failed_at_ms: AtomicI64,
}

impl SymbolResolver {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        cache: Arc<TieredCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            cache,
            clock,
            ttl: Duration::from_millis(SYMBOL_MAP_TTL_MS as u64),
            retry_after: Duration::from_millis(DISCOVERY_RETRY_MS as u64),
            scope: DISCOVERY_SCOPE.to_string(),
            rebuild: Mutex::new(()),
            failed_at_ms: AtomicI64::new(0),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// How long a failed discovery call suppresses the next one.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Credential scope used for discovery calls.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Resolves `spec` to the identifier the provider understands.
    ///
    /// An unresolvable pair comes back unchanged with `resolved == false`;
    /// downstream fetches are expected to fail softly. Only a missing
    /// discovery credential is returned as an error.
    pub async fn resolve(&self, spec: &InstrumentSpec) -> Result<ResolvedSpec> {
        if !spec.is_synthetic() {
            return Ok(ResolvedSpec::identity(spec));
        }

        let code = spec.compact_code();
        let snapshot = self.table(false).await?;
        match snapshot.and_then(|s| s.map.get(&code).cloned()) {
            Some(native) => Ok(ResolvedSpec {
                spec: spec.clone(),
                provider_symbol: Arc::from(native),
                resolved: true,
            }),
            None => {
                debug!("No provider symbol for {}, using it as-is", spec.symbol);
                Ok(ResolvedSpec {
                    spec: spec.clone(),
                    provider_symbol: spec.symbol.clone(),
                    resolved: false,
                })
            }
        }
    }

    /// Rebuilds the discovery table regardless of its age.
    ///
    /// Returns the number of pairs in the new table.
    pub async fn force_refresh(&self) -> Result<usize> {
        Ok(self.table(true).await?.map(|s| s.map.len()).unwrap_or(0))
    }

    /// The persisted table, if any, without triggering discovery.
    pub fn cached(&self) -> Option<SymbolMapSnapshot> {
        self.cache.get(keys::SYMBOL_MAP_KEY)
    }

    /// Whether the next synthetic lookup will call discovery.
    pub fn needs_discovery(&self) -> bool {
        self.supports_discovery() && !self.backing_off() && self.fresh().is_none()
    }

    /// Fails when no credential is configured for the discovery scope.
    pub fn ensure_credentials(&self) -> Result<()> {
        Ok(self.provider.ensure_credentials(&self.scope)?)
    }

    pub fn clear(&self) {
        self.cache.remove(keys::SYMBOL_MAP_KEY);
    }

    fn supports_discovery(&self) -> bool {
        self.provider.capabilities().supports_pair_discovery
    }

    fn backing_off(&self) -> bool {
        let failed_at = self.failed_at_ms.load(Ordering::Relaxed);
        let elapsed = self.clock.now_ms() - failed_at;
        failed_at > 0 && (elapsed as i128) < self.retry_after.as_millis() as i128
    }

    fn fresh(&self) -> Option<SymbolMapSnapshot> {
        let snapshot = self.cached()?;
        let age = self.clock.now_ms() - snapshot.fetched_at_ms;
        (snapshot.fetched_at_ms > 0 && age >= 0 && (age as u128) < self.ttl.as_millis())
            .then_some(snapshot)
    }

    async fn table(&self, force: bool) -> Result<Option<SymbolMapSnapshot>> {
        if !force {
            if let Some(snapshot) = self.fresh() {
                return Ok(Some(snapshot));
            }
        }

        let _guard = self.rebuild.lock().await;
        // Another task may have rebuilt the table while we waited
        if !force {
            if let Some(snapshot) = self.fresh() {
                return Ok(Some(snapshot));
            }
        }

        if !self.supports_discovery() {
            debug!("{} has no pair discovery", self.provider.id());
            return Ok(self.cached());
        }
        if !force && self.backing_off() {
            debug!("Skipping pair discovery after a recent failure");
            return Ok(self.cached());
        }

        self.ensure_credentials()?;

        let ctx = RequestContext::new(self.scope.as_str());
        match self.provider.discover_synthetic_pairs(&ctx).await {
            Ok(pairs) => {
                let mut map = BTreeMap::new();
                for pair in pairs {
                    let code = pair.compact_code();
                    if code.is_empty() || pair.native_id.trim().is_empty() {
                        continue;
                    }
                    // First listing wins for duplicate codes
                    map.entry(code)
                        .or_insert_with(|| pair.native_id.trim().to_uppercase());
                }
                let snapshot = SymbolMapSnapshot {
                    fetched_at_ms: self.clock.now_ms(),
                    map,
                };
                info!(
                    "Rebuilt synthetic pair table with {} entries",
                    snapshot.map.len()
                );
                self.cache.put(keys::SYMBOL_MAP_KEY, &snapshot);
                self.failed_at_ms.store(0, Ordering::Relaxed);
                Ok(Some(snapshot))
            }
            Err(e) if e.kind().is_fatal() => Err(e.into()),
            Err(e) => {
                warn!("Synthetic pair discovery failed: {}", e);
                self.failed_at_ms
                    .store(self.clock.now_ms().max(1), Ordering::Relaxed);
                // An expired table still beats no table
                Ok(self.cached())
            }
        }
    }
}

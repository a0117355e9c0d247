use serde::{Deserialize, Serialize};

use super::TieredCache;

/// Per-tab bookkeeping stored next to a service's records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabMeta {
    pub last_updated_ms: i64,
}

impl TabMeta {
    pub fn load(cache: &TieredCache, key: &str) -> Self {
        cache.get(key).unwrap_or_default()
    }

    /// Advances the stored timestamp, never moving it backwards.
    pub fn touch(cache: &TieredCache, key: &str, updated_ms: i64) -> Self {
        let mut meta = Self::load(cache, key);
        meta.last_updated_ms = meta.last_updated_ms.max(updated_ms);
        cache.put(key, &meta);
        meta
    }

    /// The timestamp, or `None` when nothing was ever written.
    pub fn last_updated(&self) -> Option<i64> {
        (self.last_updated_ms > 0).then_some(self.last_updated_ms)
    }
}

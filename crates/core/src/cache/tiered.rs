//! In-memory mirror over a persistent [`CacheStore`].

use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::CacheStore;

/// Memory + disk cache of JSON values.
///
/// Reads hit memory first. A disk value is merged into memory only when
/// memory has nothing for that key, so a slow disk read never clobbers a
/// fresher in-memory write. Writes go to both tiers; a disk failure is
/// logged and the memory tier still serves the value.
pub struct TieredCache {
    store: Arc<dyn CacheStore>,
    memory: DashMap<String, Value>,
}

impl TieredCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            memory: DashMap::new(),
        }
    }

    /// Raw value for `key`, merging the disk copy into memory on first touch.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.memory.get(key) {
            return Some(value.clone());
        }

        let disk = match self.store.read(key) {
            Ok(value) => value?,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        let merged = self
            .memory
            .entry(key.to_string())
            .or_insert(disk)
            .value()
            .clone();
        Some(merged)
    }

    /// Decoded value for `key`. Entries that no longer decode are treated as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!("Ignoring undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Stores `value` in memory and on disk.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to encode cache entry {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.store.write(key, &value) {
            warn!("Cache write failed for {}: {}", key, e);
        }
        self.memory.insert(key.to_string(), value);
    }

    pub fn remove(&self, key: &str) {
        self.memory.remove(key);
        if let Err(e) = self.store.delete(key) {
            warn!("Cache delete failed for {}: {}", key, e);
        }
    }

    /// Removes every key starting with `prefix` from both tiers.
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        self.memory.retain(|k, _| !k.starts_with(prefix));

        let keys = match self.store.keys_with_prefix(prefix) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Cache scan failed for {}: {}", prefix, e);
                return 0;
            }
        };
        let mut removed = 0;
        for key in keys {
            match self.store.delete(&key) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Cache delete failed for {}: {}", key, e),
            }
        }
        removed
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }
}

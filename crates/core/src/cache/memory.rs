//! In-process cache store.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde_json::Value;

use super::CacheStore;
use crate::errors::{Error, Result};

/// [`CacheStore`] backed by an in-memory map.
///
/// Values are kept serialized so reads observe exactly what a persistent
/// store would return. Used in tests and when no database path is configured.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> Error {
    Error::Unexpected("memory cache lock poisoned".to_string())
}

impl CacheStore for MemoryCacheStore {
    fn read(&self, key: &str) -> Result<Option<Value>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        match entries.get(key) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, value: &Value) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), raw);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().map_err(|_| poisoned())?.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

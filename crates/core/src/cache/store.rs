//! Persistent cache storage trait.

use serde_json::Value;

use crate::errors::Result;

/// Key/value store of JSON blobs that survives process restarts.
///
/// Keys are opaque strings composed by the services (see [`super::keys`]).
/// Implementations must be safe to share between tasks; every call is
/// expected to be fast, so the methods are synchronous.
pub trait CacheStore: Send + Sync {
    /// Reads the value stored under `key`.
    fn read(&self, key: &str) -> Result<Option<Value>>;

    /// Writes `value` under `key`, replacing any previous value.
    fn write(&self, key: &str, value: &Value) -> Result<()>;

    /// Deletes `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Lists every key starting with `prefix`.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

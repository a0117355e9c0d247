//! Scoped API credentials.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::MarketDataError;

/// Maps a key scope (usually a tab id) to an API token.
///
/// Free-tier quotas are per key, so each dashboard tab can carry its own
/// credential. Lookups trim the scope and ignore blank tokens.
#[derive(Clone, Debug, Default)]
pub struct ApiKeyring {
    keys: HashMap<String, Arc<str>>,
}

impl ApiKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `token` for `scope`. Blank tokens are ignored.
    pub fn insert(&mut self, scope: &str, token: &str) {
        let token = token.trim();
        if token.is_empty() {
            return;
        }
        self.keys
            .insert(scope.trim().to_lowercase(), Arc::from(token));
    }

    pub fn with_key(mut self, scope: &str, token: &str) -> Self {
        self.insert(scope, token);
        self
    }

    pub fn get(&self, scope: &str) -> Option<Arc<str>> {
        self.keys.get(&scope.trim().to_lowercase()).cloned()
    }

    /// Returns the token for `scope` or a configuration error naming the provider.
    pub fn require(&self, provider: &str, scope: &str) -> Result<Arc<str>, MarketDataError> {
        self.get(scope).ok_or_else(|| MarketDataError::MissingApiKey {
            provider: provider.to_string(),
            scope: scope.trim().to_string(),
        })
    }

    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

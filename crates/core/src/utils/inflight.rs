//! Request coalescing keyed by resource.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};

/// Shares one outstanding future among every caller asking for the same key.
///
/// The first caller's future is stored before anything is awaited, so a
/// second caller arriving while it is pending joins it and receives a clone
/// of the same output. The entry removes itself when the future completes;
/// the next call after that starts a fresh fetch.
pub struct InFlight<K, T>
where
    K: Eq + Hash,
{
    pending: Arc<DashMap<K, Shared<BoxFuture<'static, T>>>>,
}

impl<K, T> Clone for InFlight<K, T>
where
    K: Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<K, T> Default for InFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> InFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Runs the future built by `start` unless one is already pending for `key`.
    ///
    /// Returns the output and whether this call joined an existing future.
    pub async fn run<F, Fut>(&self, key: K, start: F) -> (T, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (shared, joined) = match self.pending.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), true),
            Entry::Vacant(entry) => {
                let pending = Arc::clone(&self.pending);
                let fut = start();
                let shared = async move {
                    let output = fut.await;
                    pending.remove(&key);
                    output
                }
                .boxed()
                .shared();
                entry.insert(shared.clone());
                (shared, false)
            }
        };
        (shared.await, joined)
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};

type InFlightFuture<T> = Shared<BoxFuture<'static, Option<T>>>;

/// Concurrent calls for the same key share one spawned task.
pub struct InFlight<K, T> {
    pending: Arc<Mutex<HashMap<K, InFlightFuture<T>>>>,
}

impl<K, T> Default for InFlight<K, T> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, T> InFlight<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key` unless a run for that key is already in flight.
    ///
    /// Returns `None` only if the work panicked.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let shared = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            match pending.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let fut = work();
                    let registry = Arc::clone(&self.pending);
                    let owned_key = key.clone();
                    // The removal below blocks on the lock we hold, so it can
                    // only run after the entry is inserted.
                    let handle = tokio::spawn(async move {
                        let _deregister = Deregister {
                            registry,
                            key: Some(owned_key),
                        };
                        fut.await
                    });
                    let shared = async move { handle.await.ok() }.boxed().shared();
                    pending.insert(key, shared.clone());
                    shared
                }
            }
        };
        shared.await
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes the key once the work is done, including when it panics.
struct Deregister<K: Eq + Hash, T> {
    registry: Arc<Mutex<HashMap<K, InFlightFuture<T>>>>,
    key: Option<K>,
}

impl<K: Eq + Hash, T> Drop for Deregister<K, T> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.registry
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&key);
        }
    }
}

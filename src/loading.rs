//! Loading Cache Module
//!
//! `BlockingCache` computes a missing value at most once at a time per key.
//! The first caller to miss becomes the leader and runs the loader; callers
//! arriving while it runs block until it finishes and observe the same
//! outcome. Results, including "nothing there" (`Loaded::Missing`), are
//! stored in the backing store; failures are not.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::cache::{CacheKey, CacheValue, Store};
use crate::error::{CacheError, Result};

// == Loaded ==
/// Cached outcome of a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loaded<V> {
    Value(V),
    /// The loader ran and found nothing
    Missing,
}

impl<V> Loaded<V> {
    pub fn into_option(self) -> Option<V> {
        match self {
            Loaded::Value(value) => Some(value),
            Loaded::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Loaded::Missing)
    }
}

impl<V> From<Option<V>> for Loaded<V> {
    fn from(value: Option<V>) -> Self {
        match value {
            Some(value) => Loaded::Value(value),
            None => Loaded::Missing,
        }
    }
}

/// Computes the value for a key from a caller-supplied argument.
pub type Loader<K, V, A> = Arc<dyn Fn(&K, A) -> anyhow::Result<Option<V>> + Send + Sync>;

type Outcome<V> = std::result::Result<Option<V>, Arc<anyhow::Error>>;

// == In-Flight Computation ==
struct InFlight<V> {
    outcome: Mutex<Option<Outcome<V>>>,
    done: Condvar,
}

impl<V: Clone> InFlight<V> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn publish(&self, outcome: Outcome<V>) {
        *self.outcome.lock() = Some(outcome);
        self.done.notify_all();
    }

    fn wait(&self) -> Outcome<V> {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(outcome) = outcome.as_ref() {
                return outcome.clone();
            }
            self.done.wait(&mut outcome);
        }
    }
}

// == Blocking Cache ==
/// Single-flight loading cache over any `Store`.
pub struct BlockingCache<K: CacheKey, V: CacheValue, A = ()> {
    store: Arc<dyn Store<K, Loaded<V>>>,
    /// Keys with a computation in progress; locked only for map updates
    pending: Mutex<HashMap<K, Arc<InFlight<V>>>>,
    loader: Option<Loader<K, V, A>>,
}

impl<K: CacheKey, V: CacheValue, A> BlockingCache<K, V, A> {
    pub fn new(store: Arc<dyn Store<K, Loaded<V>>>) -> Self {
        Self {
            store,
            pending: Mutex::new(HashMap::new()),
            loader: None,
        }
    }

    /// Sets the loader used by `get_or_load`.
    pub fn with_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(&K, A) -> anyhow::Result<Option<V>> + Send + Sync + 'static,
    {
        self.loader = Some(Arc::new(loader));
        self
    }

    // == Get ==
    /// Returns the cached outcome for `key`, running `loader` if there is none.
    ///
    /// If another caller is already loading `key`, blocks until it finishes
    /// and returns its outcome; `loader` is not run. A loader error (or panic)
    /// is returned to every waiting caller as `LoaderFailed` and leaves the
    /// key uncached.
    pub fn get<F>(&self, key: &K, argument: A, loader: F) -> Result<Option<V>>
    where
        F: FnOnce(&K, A) -> anyhow::Result<Option<V>>,
    {
        if let Some(loaded) = self.store.get(key) {
            return Ok(loaded.into_option());
        }

        let flight = {
            let mut pending = self.pending.lock();
            if let Some(running) = pending.get(key).cloned() {
                Err(running)
            } else {
                // a leader may have finished since the first read
                if let Some(loaded) = self.store.get(key) {
                    return Ok(loaded.into_option());
                }
                let flight = Arc::new(InFlight::new());
                pending.insert(key.clone(), Arc::clone(&flight));
                Ok(flight)
            }
        };

        let flight = match flight {
            Ok(flight) => flight,
            Err(running) => {
                debug!(cache = %self.store.name(), ?key, "Waiting for in-flight load");
                return running.wait().map_err(|cause| failure(key, cause));
            }
        };

        let guard = FlightGuard {
            cache: self,
            key,
            flight,
            finished: false,
        };
        let outcome = loader(key, argument).map_err(Arc::new);
        if let Err(cause) = &outcome {
            warn!(cache = %self.store.name(), ?key, error = %cause, "Loader failed");
        }
        guard.finish(outcome.clone());
        outcome.map_err(|cause| failure(key, cause))
    }

    /// `get` with the loader configured by `with_loader`.
    pub fn get_or_load(&self, key: &K, argument: A) -> Result<Option<V>> {
        let loader = self
            .loader
            .clone()
            .ok_or_else(|| CacheError::NoLoader(self.store.name().to_string()))?;
        self.get(key, argument, |key, argument| loader(key, argument))
    }

    /// Stores a value directly, bypassing any loader.
    pub fn put(&self, key: K, value: V) {
        self.store.put(key, Loaded::Value(value));
    }

    /// Forgets the cached outcome for `key`. Returns false if none was cached.
    pub fn remove(&self, key: &K) -> bool {
        self.store.remove(key).is_some()
    }

    pub fn remove_where(&self, predicate: &dyn Fn(&K) -> bool) -> usize {
        self.store.remove_where(predicate)
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn store(&self) -> &Arc<dyn Store<K, Loaded<V>>> {
        &self.store
    }

    /// Stores a successful outcome, clears the in-flight marker and wakes
    /// the waiters, in that order.
    fn complete(&self, key: &K, flight: &Arc<InFlight<V>>, outcome: Outcome<V>) {
        if let Ok(value) = &outcome {
            self.store.put(key.clone(), Loaded::from(value.clone()));
        }
        {
            let mut pending = self.pending.lock();
            if pending
                .get(key)
                .is_some_and(|current| Arc::ptr_eq(current, flight))
            {
                pending.remove(key);
            }
        }
        flight.publish(outcome);
    }
}

fn failure<K: CacheKey>(key: &K, cause: Arc<anyhow::Error>) -> CacheError {
    CacheError::LoaderFailed {
        key: format!("{:?}", key),
        cause,
    }
}

/// Releases the waiters of a leader even if its loader panics.
struct FlightGuard<'a, K: CacheKey, V: CacheValue, A> {
    cache: &'a BlockingCache<K, V, A>,
    key: &'a K,
    flight: Arc<InFlight<V>>,
    finished: bool,
}

impl<K: CacheKey, V: CacheValue, A> FlightGuard<'_, K, V, A> {
    fn finish(mut self, outcome: Outcome<V>) {
        self.finished = true;
        self.cache.complete(self.key, &self.flight, outcome);
    }
}

impl<K: CacheKey, V: CacheValue, A> Drop for FlightGuard<'_, K, V, A> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(cache = %self.cache.store.name(), key = ?self.key, "Loader panicked");
            self.cache.complete(
                self.key,
                &self.flight,
                Err(Arc::new(anyhow!("loader panicked"))),
            );
        }
    }
}

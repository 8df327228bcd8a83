//! Native Backend
//!
//! Thread-safe facade over `TtlStore`: every operation takes the store's
//! mutex for its whole duration.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::backend::BackendKind;
use crate::cache::{CacheKey, CacheValue, KnownCache, Store, TtlStore};
use crate::error::Result;

/// `TtlStore` shared between threads.
#[derive(Debug)]
pub struct NativeStore<K, V> {
    name: String,
    inner: Mutex<TtlStore<K, V>>,
    closed: AtomicBool,
}

impl<K: CacheKey, V: CacheValue> NativeStore<K, V> {
    pub fn new(store: TtlStore<K, V>) -> Self {
        Self {
            name: store.name().to_string(),
            inner: Mutex::new(store),
            closed: AtomicBool::new(false),
        }
    }

    /// Remaining lifetime of a live entry; `Some(None)` when it never expires.
    pub fn ttl_remaining(&self, key: &K) -> Option<Option<Duration>> {
        self.inner.lock().ttl_remaining(key)
    }
}

impl<K: CacheKey, V: CacheValue> KnownCache for NativeStore<K, V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Native
    }

    fn len(&self) -> usize {
        self.inner.lock().len()
    }

    fn limit(&self) -> usize {
        self.inner.lock().limit()
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.inner.lock().default_ttl()
    }

    fn clear(&self) {
        self.inner.lock().clear();
    }

    fn purge_expired(&self) -> usize {
        self.inner.lock().purge_expired()
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.inner.lock().clear();
            debug!(cache = %self.name, "Closed native cache");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<K: CacheKey, V: CacheValue> Store<K, V> for NativeStore<K, V> {
    fn put(&self, key: K, value: V) {
        self.inner.lock().put(key, value);
    }

    fn put_with_ttl(&self, key: K, value: V, ttl: Duration) -> Result<()> {
        self.inner.lock().put_with_ttl(key, value, ttl)
    }

    fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key)
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().remove(key)
    }

    fn remove_where(&self, predicate: &dyn Fn(&K) -> bool) -> usize {
        self.inner.lock().remove_where(predicate)
    }

    fn keys(&self) -> HashSet<K> {
        self.inner.lock().keys().into_iter().collect()
    }
}

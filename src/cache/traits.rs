//! Store Traits Module
//!
//! The contract every backend satisfies, plus the type-erased view used by
//! the manager's registry of known caches.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use crate::backend::BackendKind;
use crate::error::Result;

/// Bounds shared by every cache key.
pub trait CacheKey: Hash + Eq + Clone + Debug + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Hash + Eq + Clone + Debug + Send + Sync + 'static {}

/// Bounds shared by every cached value.
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + 'static {}

// == Known Cache ==
/// Key/value independent view of a cache, used for diagnostics and bulk
/// lifecycle operations.
pub trait KnownCache: Send + Sync {
    /// Unique instance name (debug name plus instance counter)
    fn name(&self) -> &str;

    fn backend(&self) -> BackendKind;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry limit, `UNLIMITED` for none
    fn limit(&self) -> usize;

    fn default_ttl(&self) -> Option<Duration>;

    fn clear(&self);

    /// Removes expired entries, returning how many were dropped.
    fn purge_expired(&self) -> usize;

    /// Releases backend resources. The cache stays usable but is no longer
    /// reported by the manager.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

// == Store ==
/// Thread-safe key/value cache.
pub trait Store<K: CacheKey, V: CacheValue>: KnownCache {
    /// Stores a value with the cache's default TTL.
    fn put(&self, key: K, value: V);

    /// Stores a value with its own TTL, rejected above `MAX_TTL`.
    fn put_with_ttl(&self, key: K, value: V, ttl: Duration) -> Result<()>;

    fn get(&self, key: &K) -> Option<V>;

    fn remove(&self, key: &K) -> Option<V>;

    /// Removes entries matching `predicate` (and expired ones the backend can
    /// see). Returns the number removed.
    fn remove_where(&self, predicate: &dyn Fn(&K) -> bool) -> usize;

    fn keys(&self) -> HashSet<K>;
}

// == String Key Store ==
/// Prefix invalidation for string-keyed caches.
pub trait StringKeyStore {
    /// Removes every entry whose key starts with `prefix`.
    fn remove_using_prefix(&self, prefix: &str) -> usize;
}

impl<V: CacheValue> StringKeyStore for dyn Store<String, V> {
    fn remove_using_prefix(&self, prefix: &str) -> usize {
        self.remove_where(&|key: &String| key.starts_with(prefix))
    }
}

//! Moka Backend
//!
//! Bridges a `moka::sync::Cache` to the `Store` contract. Limits and
//! durations from a `CacheSpec` become moka builder settings; a per-entry
//! TTL override rides along with the value and is applied by `TimedExpiry`.
//!
//! Moka hides an expired entry from reads and iteration at once, but keeps it
//! resident until its timer wheel ticks over. Sizes are therefore counted
//! from iteration, and `purge_expired` evicts the hidden entries itself.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::sync::Cache;
use moka::Expiry;
use tracing::{debug, warn};

use crate::backend::{BackendKind, LockingEngineManager};
use crate::cache::{validate_ttl, CacheKey, CacheValue, KnownCache, Store, UNLIMITED};
use crate::error::Result;

/// Value plus the TTL it was stored with, None = the cache default.
#[derive(Debug, Clone)]
struct Timed<V> {
    value: V,
    ttl: Option<Duration>,
    stored_at: Instant,
}

impl<V> Timed<V> {
    fn new(value: V, ttl: Option<Duration>) -> Self {
        Self {
            value,
            ttl,
            stored_at: Instant::now(),
        }
    }
}

struct TimedExpiry {
    default_ttl: Option<Duration>,
}

impl<K, V> Expiry<K, Timed<V>> for TimedExpiry {
    fn expire_after_create(
        &self,
        _key: &K,
        value: &Timed<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl.or(self.default_ttl)
    }

    fn expire_after_update(
        &self,
        _key: &K,
        value: &Timed<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl.or(self.default_ttl)
    }
}

/// Store backed by a moka cache registered with the engine manager.
pub struct MokaStore<K, V> {
    name: String,
    cache: Cache<K, Timed<V>>,
    limit: usize,
    default_ttl: Option<Duration>,
    manager: Arc<LockingEngineManager>,
    closed: AtomicBool,
}

impl<K: CacheKey, V: CacheValue> MokaStore<K, V> {
    /// Builds the moka cache and registers it with `manager` under `name`.
    ///
    /// `limit` of `UNLIMITED` leaves the cache unbounded; a None TTL or TTI
    /// leaves that expiration off.
    pub fn build(
        name: String,
        limit: usize,
        default_ttl: Option<Duration>,
        default_tti: Option<Duration>,
        manager: Arc<LockingEngineManager>,
    ) -> Result<Self> {
        let mut builder = Cache::<K, Timed<V>>::builder()
            .name(&name)
            .expire_after(TimedExpiry { default_ttl })
            .support_invalidation_closures();
        if limit != UNLIMITED {
            builder = builder.max_capacity(limit as u64);
        }
        if let Some(tti) = default_tti {
            builder = builder.time_to_idle(tti);
        }
        let cache = builder.build();

        manager.add_cache(&name, Arc::new(cache.clone()))?;

        Ok(Self {
            name,
            cache,
            limit,
            default_ttl,
            manager,
            closed: AtomicBool::new(false),
        })
    }

    /// Evicts the entries moka already hides as expired and returns how
    /// many there were.
    fn evict_expired(&self) -> usize {
        self.cache.run_pending_tasks();
        let cutoff = Instant::now();
        let resident = self.cache.entry_count() as usize;
        let live = self.keys();
        let expired = resident.saturating_sub(live.len());
        if expired == 0 {
            return 0;
        }

        // Entries stored after `cutoff` may be missing from `live` yet fresh.
        let evicted = self.cache.invalidate_entries_if(move |key: &K, timed: &Timed<V>| {
            timed.stored_at <= cutoff && !live.contains(key)
        });
        if let Err(err) = evicted {
            warn!(cache = %self.name, "Failed to evict expired entries: {}", err);
            return 0;
        }
        self.cache.run_pending_tasks();
        expired
    }
}

impl<K: CacheKey, V: CacheValue> KnownCache for MokaStore<K, V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Moka
    }

    fn len(&self) -> usize {
        self.cache.run_pending_tasks();
        self.cache.iter().count()
    }

    fn limit(&self) -> usize {
        self.limit
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }

    fn purge_expired(&self) -> usize {
        self.evict_expired()
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.manager.remove_cache(&self.name);
            self.clear();
            debug!(cache = %self.name, "Closed moka cache");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<K, V> Drop for MokaStore<K, V> {
    fn drop(&mut self) {
        if !*self.closed.get_mut() {
            self.manager.remove_cache(&self.name);
        }
    }
}

impl<K: CacheKey, V: CacheValue> Store<K, V> for MokaStore<K, V> {
    fn put(&self, key: K, value: V) {
        self.cache.insert(key, Timed::new(value, None));
    }

    fn put_with_ttl(&self, key: K, value: V, ttl: Duration) -> Result<()> {
        validate_ttl(ttl)?;
        self.cache.insert(key, Timed::new(value, Some(ttl)));
        Ok(())
    }

    fn get(&self, key: &K) -> Option<V> {
        self.cache.get(key).map(|timed| timed.value)
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.cache.remove(key).map(|timed| timed.value)
    }

    /// Expired entries are evicted and counted along with the live matches.
    fn remove_where(&self, predicate: &dyn Fn(&K) -> bool) -> usize {
        let expired = self.evict_expired();
        let doomed: Vec<Arc<K>> = self
            .cache
            .iter()
            .map(|(key, _)| key)
            .filter(|key| predicate(key))
            .collect();
        for key in &doomed {
            self.cache.invalidate(key.as_ref());
        }
        self.cache.run_pending_tasks();
        expired + doomed.len()
    }

    fn keys(&self) -> HashSet<K> {
        self.cache.iter().map(|(key, _)| (*key).clone()).collect()
    }
}

//! TTL Store Module
//!
//! LRU entry store combined with per-entry expiration and reclaimable values.

use std::borrow::Borrow;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::cache::{
    ChainCorruption, EntryStore, MemoryPressure, ReclaimQueue, SoftValue, TtlEntry,
    DEFAULT_TRAVERSAL_LIMIT, MAX_TTL,
};
use crate::error::{CacheError, Result};

// == Integrity Mode ==
/// What a corrupt entry chain escalates to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IntegrityMode {
    /// Log a warning and finish the operation best-effort
    #[default]
    Lenient,
    /// Panic; meant for development and diagnostic runs
    Strict,
}

/// Rejects a time-to-live above `MAX_TTL`.
pub fn validate_ttl(ttl: Duration) -> Result<()> {
    if ttl > MAX_TTL {
        return Err(CacheError::InvalidTtl { ttl, max: MAX_TTL });
    }
    Ok(())
}

// == TTL Store ==
/// Cache map with LRU eviction, TTL expiration and reclaimable values.
///
/// Not synchronized; `NativeStore` wraps it in a mutex for shared use.
#[derive(Debug)]
pub struct TtlStore<K, V> {
    /// Debug name used in log records
    name: String,
    entries: EntryStore<K, TtlEntry<K, V>>,
    queue: ReclaimQueue<K>,
    pressure: Option<MemoryPressure>,
    /// Maximum number of entries allowed
    limit: usize,
    /// TTL for entries stored without an explicit one
    default_ttl: Option<Duration>,
    traversal_limit: usize,
    integrity: IntegrityMode,
}

impl<K, V> TtlStore<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + 'static,
{
    // == Constructor ==
    /// Creates a TtlStore with the given capacity and default TTL.
    ///
    /// # Arguments
    /// * `name` - Debug name for log records
    /// * `limit` - Maximum number of entries (`UNLIMITED` for no bound)
    /// * `default_ttl` - TTL for entries stored without one, None = never expire
    pub fn new(name: impl Into<String>, limit: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            name: name.into(),
            entries: EntryStore::new(),
            queue: ReclaimQueue::new(),
            pressure: None,
            limit,
            default_ttl,
            traversal_limit: DEFAULT_TRAVERSAL_LIMIT,
            integrity: IntegrityMode::default(),
        }
    }

    /// Registers every stored value with `pressure`.
    pub fn with_pressure(mut self, pressure: MemoryPressure) -> Self {
        self.pressure = Some(pressure);
        self
    }

    pub fn with_traversal_limit(mut self, traversal_limit: usize) -> Self {
        self.traversal_limit = traversal_limit;
        self
    }

    pub fn with_integrity(mut self, integrity: IntegrityMode) -> Self {
        self.integrity = integrity;
        self
    }

    // == Put ==
    /// Stores a value with the default TTL.
    ///
    /// If the key already exists, the value is overwritten and the TTL reset.
    pub fn put(&mut self, key: K, value: V) {
        self.insert(key, value, self.default_ttl);
    }

    /// Stores a value with an explicit TTL, rejecting one above `MAX_TTL`.
    pub fn put_with_ttl(&mut self, key: K, value: V, ttl: Duration) -> Result<()> {
        validate_ttl(ttl)?;
        self.insert(key, value, Some(ttl));
        Ok(())
    }

    fn insert(&mut self, key: K, value: V, ttl: Option<Duration>) {
        self.drain_reclaimed();

        let value = SoftValue::new(key.clone(), value, &self.queue, self.pressure.as_ref());
        self.entries.insert(key, TtlEntry::new(value, ttl));

        self.evict();
    }

    /// Removes from the LRU end while over the limit or while the LRU entry
    /// has expired.
    fn evict(&mut self) {
        let now = Instant::now();
        loop {
            let over_limit = self.entries.len() > self.limit;
            let evicted = self
                .entries
                .remove_lru_if(|_, entry| over_limit || entry.is_expired_at(now));
            match evicted {
                Some((key, _)) => debug!(cache = %self.name, ?key, over_limit, "Evicted entry"),
                None => break,
            }
        }
    }

    /// Drops entries whose values were reclaimed since the last drain.
    fn drain_reclaimed(&mut self) {
        let mut dropped = 0;
        for key in self.queue.drain() {
            let reclaimed = self
                .entries
                .peek(&key)
                .is_some_and(|entry| entry.value.is_reclaimed());
            if reclaimed {
                self.entries.remove(&key);
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(cache = %self.name, dropped, "Dropped reclaimed entries");
        }
    }

    // == Get ==
    /// Retrieves a value by key and marks it most recently used.
    ///
    /// Expired or reclaimed entries are removed and reported as absent.
    pub fn get<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.entries.peek(key)?.is_expired() {
            self.entries.remove(key);
            return None;
        }

        let value = self.entries.find(key).and_then(|entry| entry.value.get());
        if value.is_none() {
            // reclaimed between the expiry check and the read
            self.entries.remove(key);
        }
        value
    }

    // == Remove ==
    /// Removes an entry, returning its value if it was still live.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries
            .remove(key)
            .filter(|entry| !entry.is_expired())
            .and_then(|entry| entry.value.get())
    }

    // == Remove Where ==
    /// Removes every entry that has expired or whose key matches `predicate`.
    ///
    /// Returns the number of entries removed. A corrupt chain stops the scan
    /// early; whatever was found up to that point is still removed.
    pub fn remove_where<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&K) -> bool,
    {
        let now = Instant::now();
        let mut doomed = Vec::new();
        let walk = self.entries.traverse(self.traversal_limit, |key, entry| {
            if entry.is_expired_at(now) || predicate(key) {
                doomed.push(key.clone());
            }
        });

        match walk {
            // every reclaimed entry was just visited
            Ok(_) => drop(self.queue.drain()),
            Err(corruption) => self.report_corruption("remove_where", &corruption),
        }

        doomed
            .iter()
            .filter(|key| self.entries.remove(*key).is_some())
            .count()
    }

    // == Purge Expired ==
    /// Removes all expired entries. Returns the number removed.
    pub fn purge_expired(&mut self) -> usize {
        self.remove_where(|_| false)
    }

    // == Keys ==
    /// Returns the keys of live entries, most recently used first.
    pub fn keys(&self) -> Vec<K> {
        let now = Instant::now();
        let mut keys = Vec::with_capacity(self.entries.len());
        let walk = self.entries.traverse(self.traversal_limit, |key, entry| {
            if !entry.is_expired_at(now) {
                keys.push(key.clone());
            }
        });
        if let Err(corruption) = walk {
            self.report_corruption("keys", &corruption);
        }
        keys
    }

    // == Clear ==
    /// Releases every value and empties the store.
    pub fn clear(&mut self) {
        let walk = self
            .entries
            .traverse(self.traversal_limit, |_, entry| entry.value.release());
        if let Err(corruption) = walk {
            self.report_corruption("clear", &corruption);
        }
        self.entries.clear();
        drop(self.queue.drain());
    }

    /// Remaining lifetime of a live entry; `Some(None)` when it never expires.
    pub fn ttl_remaining<Q>(&self, key: &Q) -> Option<Option<Duration>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries
            .peek(key)
            .filter(|entry| !entry.is_expired())
            .map(TtlEntry::ttl_remaining)
    }

    fn report_corruption(&self, operation: &str, corruption: &ChainCorruption<K>) {
        warn!(
            cache = %self.name,
            operation,
            visited = corruption.visited,
            traversal_limit = self.traversal_limit,
            sample = ?corruption.sample,
            "Entry chain looks corrupt, traversal aborted"
        );
        if self.integrity == IntegrityMode::Strict {
            panic!(
                "corrupt entry chain in cache {} during {}: visited {} nodes, sample {:?}",
                self.name, operation, corruption.visited, corruption.sample
            );
        }
    }
}

impl<K, V> TtlStore<K, V> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current number of entries, expired ones included until
    /// they are noticed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }
}

//! Capacity-Limited Store Module
//!
//! A plain LRU map: no expiration, evicts the least recently used entry as
//! soon as a put takes it past its limit.

use std::borrow::Borrow;
use std::hash::Hash;

use tracing::debug;

use crate::cache::EntryStore;

// == Limited Store ==
/// LRU map holding at most `limit` entries after every put.
#[derive(Debug)]
pub struct LimitedStore<K, V> {
    entries: EntryStore<K, V>,
    limit: usize,
}

impl<K, V> LimitedStore<K, V>
where
    K: Hash + Eq + Clone,
{
    // == Constructor ==
    pub fn new(limit: usize) -> Self {
        Self {
            entries: EntryStore::new(),
            limit,
        }
    }

    // == Put ==
    /// Inserts or replaces a value, then evicts from the LRU end until the
    /// store is back within its limit.
    ///
    /// Returns the value previously stored under `key`.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        let previous = self.entries.insert(key, value);

        while self.entries.len() > self.limit {
            if self.entries.pop_lru().is_none() {
                break;
            }
            debug!(limit = self.limit, "Evicted least recently used entry");
        }

        previous
    }

    // == Get ==
    /// Returns the value and marks it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.find(key).map(|value| &*value)
    }

    // == Remove ==
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

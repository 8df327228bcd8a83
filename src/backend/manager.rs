//! Engine Manager
//!
//! Registry of the moka caches created by the moka provider. `EngineManager`
//! mutates its registry through `&mut self`; `LockingEngineManager` is the
//! shared form, taking a single lock around every registry-level operation so
//! that cache creation, removal, listing and shutdown never interleave.
//! Reads and writes on the caches themselves are not locked here.

use std::collections::BTreeMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{CacheError, Result};

// == Managed Cache ==
/// Lifecycle hooks the manager needs from an engine cache.
pub trait ManagedCache: Send + Sync {
    fn invalidate_all(&self);

    fn run_pending_tasks(&self);
}

impl<K, V> ManagedCache for moka::sync::Cache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn invalidate_all(&self) {
        moka::sync::Cache::invalidate_all(self);
    }

    fn run_pending_tasks(&self) {
        moka::sync::Cache::run_pending_tasks(self);
    }
}

// == Engine Manager ==
/// Named caches owned by the engine.
#[derive(Default)]
pub struct EngineManager {
    caches: BTreeMap<String, Arc<dyn ManagedCache>>,
    shut_down: bool,
}

impl EngineManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cache under a name not already in use.
    pub fn add_cache(&mut self, name: &str, cache: Arc<dyn ManagedCache>) -> Result<()> {
        if self.shut_down {
            return Err(CacheError::Backend(format!(
                "cannot add cache '{}': engine manager is shut down",
                name
            )));
        }
        if self.caches.contains_key(name) {
            return Err(CacheError::Backend(format!(
                "cache '{}' is already registered",
                name
            )));
        }
        self.caches.insert(name.to_string(), cache);
        debug!(cache = name, "Registered engine cache");
        Ok(())
    }

    /// Unregisters a cache and drops its entries. Returns false when the
    /// name is unknown.
    pub fn remove_cache(&mut self, name: &str) -> bool {
        match self.caches.remove(name) {
            Some(cache) => {
                cache.invalidate_all();
                cache.run_pending_tasks();
                debug!(cache = name, "Removed engine cache");
                true
            }
            None => false,
        }
    }

    pub fn cache_names(&self) -> Vec<String> {
        self.caches.keys().cloned().collect()
    }

    /// Drops every cache and refuses further registrations. Returns the
    /// number of caches released.
    pub fn shutdown(&mut self) -> usize {
        let released = self.caches.len();
        for cache in self.caches.values() {
            cache.invalidate_all();
            cache.run_pending_tasks();
        }
        self.caches.clear();
        self.shut_down = true;
        info!(released, "Engine manager shut down");
        released
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

// == Locking Engine Manager ==
/// `EngineManager` safe to share between threads.
#[derive(Default)]
pub struct LockingEngineManager {
    inner: Mutex<EngineManager>,
}

impl LockingEngineManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cache(&self, name: &str, cache: Arc<dyn ManagedCache>) -> Result<()> {
        self.inner.lock().add_cache(name, cache)
    }

    pub fn remove_cache(&self, name: &str) -> bool {
        self.inner.lock().remove_cache(name)
    }

    pub fn cache_names(&self) -> Vec<String> {
        self.inner.lock().cache_names()
    }

    pub fn shutdown(&self) -> usize {
        self.inner.lock().shutdown()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.lock().is_shut_down()
    }
}

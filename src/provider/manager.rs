//! Cache Manager
//!
//! The service object consumers ask for caches. It owns one provider per
//! backend, keeps weak references to everything it hands out and releases
//! all backend resources on shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{BackendKind, LockingEngineManager};
use crate::cache::{CacheKey, CacheValue, KnownCache, MemoryPressure, Store};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::loading::{BlockingCache, Loaded};
use crate::provider::{
    CacheInfo, CacheProvider, CacheRegistry, CacheSpec, MokaProvider, NativeProvider,
};

/// Callback run after `clear_all_known_caches`.
pub type ClearListener = Box<dyn Fn() + Send + Sync>;

pub struct CacheManager {
    config: Config,
    native: NativeProvider,
    moka: MokaProvider,
    registry: CacheRegistry,
    listeners: Mutex<Vec<ClearListener>>,
    shut_down: AtomicBool,
}

impl CacheManager {
    // == Constructor ==
    /// Creates both providers from `config`.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let pressure = match config.soft_value_budget {
            Some(budget) => MemoryPressure::with_budget(budget),
            None => MemoryPressure::new(),
        };
        let native = NativeProvider::new(
            pressure,
            config.traversal_limit,
            config.integrity_mode(),
        );
        let moka = MokaProvider::new(Arc::new(LockingEngineManager::new()));

        info!(
            backend = %config.backend,
            traversal_limit = config.traversal_limit,
            strict_integrity = config.strict_integrity,
            soft_value_budget = ?config.soft_value_budget,
            "Cache manager started"
        );

        Ok(Self {
            config,
            native,
            moka,
            registry: CacheRegistry::new(),
            listeners: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Coordinator the host signals memory pressure through.
    pub fn memory_pressure(&self) -> &MemoryPressure {
        self.native.memory_pressure()
    }

    pub fn engine_manager(&self) -> &Arc<LockingEngineManager> {
        self.moka.engine_manager()
    }

    // == Get Cache ==
    /// Creates a cache on the configured backend.
    pub fn get_cache<K: CacheKey, V: CacheValue>(
        &self,
        spec: &CacheSpec,
    ) -> Result<Arc<dyn Store<K, V>>> {
        self.get_cache_on(self.config.backend, spec)
    }

    /// Creates a cache on an explicitly chosen backend.
    pub fn get_cache_on<K: CacheKey, V: CacheValue>(
        &self,
        backend: BackendKind,
        spec: &CacheSpec,
    ) -> Result<Arc<dyn Store<K, V>>> {
        if self.is_shut_down() {
            return Err(CacheError::Backend(format!(
                "cannot create cache '{}': cache manager is shut down",
                spec.name
            )));
        }
        match backend {
            BackendKind::Native => self.hand_out(&self.native, spec),
            BackendKind::Moka => self.hand_out(&self.moka, spec),
        }
    }

    fn hand_out<P, K, V>(&self, provider: &P, spec: &CacheSpec) -> Result<Arc<dyn Store<K, V>>>
    where
        P: CacheProvider,
        K: CacheKey,
        V: CacheValue,
    {
        let store = provider.get_store::<K, V>(spec)?;
        let known: Weak<dyn KnownCache> = Arc::downgrade(&store) as Weak<P::Handle<K, V>>;
        self.registry.register(known, spec.temporary);
        debug!(
            cache = store.name(),
            backend = %provider.kind(),
            temporary = spec.temporary,
            "Created cache"
        );
        Ok(store)
    }

    /// Creates a single-flight loading cache on the configured backend.
    pub fn get_blocking_cache<K: CacheKey, V: CacheValue, A>(
        &self,
        spec: &CacheSpec,
    ) -> Result<BlockingCache<K, V, A>> {
        let store = self.get_cache::<K, Loaded<V>>(spec)?;
        Ok(BlockingCache::new(store))
    }

    // == Known Caches ==
    /// Snapshot of every cache still alive and open.
    pub fn known_caches(&self) -> Vec<CacheInfo> {
        self.registry.snapshot()
    }

    /// Clears every known cache, then runs the registered listeners.
    /// Returns the number of caches cleared.
    pub fn clear_all_known_caches(&self) -> usize {
        let mut cleared = 0;
        self.registry.for_each(|cache| {
            cache.clear();
            cleared += 1;
        });
        for listener in self.listeners.lock().iter() {
            listener();
        }
        info!(cleared, "Cleared all known caches");
        cleared
    }

    /// Registers a callback for `clear_all_known_caches`. Listeners must not
    /// register further listeners.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.lock().push(Box::new(listener));
    }

    /// Drops expired entries from every known cache.
    pub fn purge_expired(&self) -> usize {
        let mut purged = 0;
        self.registry.for_each(|cache| purged += cache.purge_expired());
        purged
    }

    /// Temporary caches still open after `older_than`, each logged as a
    /// probable leak.
    pub fn audit_temporary_caches(&self, older_than: Duration) -> Vec<CacheInfo> {
        let leaked = self.registry.temporaries_older_than(older_than);
        for cache in &leaked {
            warn!(
                cache = %cache.name,
                backend = %cache.backend,
                size = cache.size,
                created_at = %cache.created_at,
                "Temporary cache was never closed"
            );
        }
        leaked
    }

    // == Shutdown ==
    /// Closes every known cache and releases both providers. Later calls
    /// do nothing; later `get_cache` calls fail.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut closed = 0;
        self.registry.for_each(|cache| {
            cache.close();
            closed += 1;
        });
        self.native.shutdown();
        self.moka.shutdown();

        info!(closed, "Cache manager shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn manager(backend: BackendKind) -> CacheManager {
        CacheManager::new(Config {
            backend,
            ..Config::default()
        })
        .unwrap()
    }

    #[test]
    fn test_get_cache_uses_configured_backend() {
        let native = manager(BackendKind::Native);
        let moka = manager(BackendKind::Moka);

        let a = native.get_cache::<String, u32>(&CacheSpec::new("a")).unwrap();
        let b = moka.get_cache::<String, u32>(&CacheSpec::new("b")).unwrap();

        assert_eq!(a.backend(), BackendKind::Native);
        assert_eq!(b.backend(), BackendKind::Moka);
        assert_eq!(moka.engine_manager().cache_names(), vec!["b#1".to_string()]);
    }

    #[test]
    fn test_known_caches_follow_owners() {
        let manager = manager(BackendKind::Native);
        let kept = manager
            .get_cache::<String, u32>(&CacheSpec::new("kept").limit(5))
            .unwrap();
        let dropped = manager
            .get_cache_on::<String, u32>(BackendKind::Moka, &CacheSpec::new("dropped"))
            .unwrap();
        kept.put("a".to_string(), 1);

        assert_eq!(manager.known_caches().len(), 2);

        drop(dropped);
        let known = manager.known_caches();

        assert_eq!(known.len(), 1);
        assert_eq!(known[0].name, "kept#1");
        assert_eq!(known[0].size, 1);
        assert_eq!(known[0].limit, Some(5));
    }

    #[test]
    fn test_clear_all_runs_listeners() {
        let manager = manager(BackendKind::Native);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        manager.add_listener(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let cache = manager.get_cache::<String, u32>(&CacheSpec::new("c")).unwrap();
        cache.put("a".to_string(), 1);

        assert_eq!(manager.clear_all_known_caches(), 1);

        assert!(cache.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_spec_is_rejected() {
        let manager = manager(BackendKind::Native);

        let result = manager.get_cache::<String, u32>(&CacheSpec::new("zero").limit(0));

        assert!(matches!(result, Err(CacheError::InvalidSpec(_))));
        assert!(manager.known_caches().is_empty());
    }

    #[test]
    fn test_shutdown_closes_everything() {
        let manager = manager(BackendKind::Native);
        let native = manager.get_cache::<String, u32>(&CacheSpec::new("n")).unwrap();
        let moka = manager
            .get_cache_on::<String, u32>(BackendKind::Moka, &CacheSpec::new("m"))
            .unwrap();
        native.put("a".to_string(), 1);
        moka.put("a".to_string(), 1);

        manager.shutdown();
        manager.shutdown();

        assert!(manager.is_shut_down());
        assert!(native.is_closed());
        assert!(moka.is_closed());
        assert!(native.is_empty());
        assert!(manager.engine_manager().is_shut_down());
        assert!(manager.known_caches().is_empty());
        assert!(matches!(
            manager.get_cache::<String, u32>(&CacheSpec::new("late")),
            Err(CacheError::Backend(_))
        ));
    }

    #[test]
    fn test_blocking_cache_from_manager() {
        let manager = manager(BackendKind::Moka);
        let cache = manager
            .get_blocking_cache::<String, u32, ()>(&CacheSpec::new("loading"))
            .unwrap()
            .with_loader(|key: &String, _| Ok(Some(key.len() as u32)));

        assert_eq!(cache.get_or_load(&"four".to_string(), ()).unwrap(), Some(4));
        assert_eq!(manager.known_caches()[0].name, "loading#1");
    }
}

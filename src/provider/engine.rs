//! Moka Provider
//!
//! Hands out `MokaStore`s registered with a shared `LockingEngineManager`.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use crate::backend::{BackendKind, LockingEngineManager, MokaStore};
use crate::cache::{CacheKey, CacheValue};
use crate::error::Result;
use crate::provider::{instance_name, CacheProvider, CacheSpec};

#[derive(Default)]
pub struct MokaProvider {
    manager: Arc<LockingEngineManager>,
    counter: AtomicU64,
}

impl MokaProvider {
    pub fn new(manager: Arc<LockingEngineManager>) -> Self {
        Self {
            manager,
            counter: AtomicU64::new(0),
        }
    }

    pub fn engine_manager(&self) -> &Arc<LockingEngineManager> {
        &self.manager
    }
}

impl CacheProvider for MokaProvider {
    type Handle<K: CacheKey, V: CacheValue> = MokaStore<K, V>;

    fn kind(&self) -> BackendKind {
        BackendKind::Moka
    }

    fn get_store<K: CacheKey, V: CacheValue>(
        &self,
        spec: &CacheSpec,
    ) -> Result<Arc<MokaStore<K, V>>> {
        spec.validate()?;
        let store = MokaStore::build(
            instance_name(&spec.name, &self.counter),
            spec.limit,
            spec.default_ttl,
            spec.default_tti,
            Arc::clone(&self.manager),
        )?;
        Ok(Arc::new(store))
    }

    fn shutdown(&self) {
        self.manager.shutdown();
    }
}

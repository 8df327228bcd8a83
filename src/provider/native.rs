//! Native Provider
//!
//! Hands out `NativeStore`s whose values all register with one shared
//! `MemoryPressure` coordinator.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{BackendKind, NativeStore};
use crate::cache::{
    CacheKey, CacheValue, IntegrityMode, MemoryPressure, TtlStore, DEFAULT_TRAVERSAL_LIMIT,
};
use crate::error::Result;
use crate::provider::{instance_name, CacheProvider, CacheSpec};

#[derive(Debug)]
pub struct NativeProvider {
    pressure: MemoryPressure,
    traversal_limit: usize,
    integrity: IntegrityMode,
    counter: AtomicU64,
}

impl NativeProvider {
    pub fn new(pressure: MemoryPressure, traversal_limit: usize, integrity: IntegrityMode) -> Self {
        Self {
            pressure,
            traversal_limit,
            integrity,
            counter: AtomicU64::new(0),
        }
    }

    pub fn memory_pressure(&self) -> &MemoryPressure {
        &self.pressure
    }
}

impl Default for NativeProvider {
    fn default() -> Self {
        Self::new(
            MemoryPressure::new(),
            DEFAULT_TRAVERSAL_LIMIT,
            IntegrityMode::default(),
        )
    }
}

impl CacheProvider for NativeProvider {
    type Handle<K: CacheKey, V: CacheValue> = NativeStore<K, V>;

    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn get_store<K: CacheKey, V: CacheValue>(
        &self,
        spec: &CacheSpec,
    ) -> Result<Arc<NativeStore<K, V>>> {
        spec.validate()?;
        let name = instance_name(&spec.name, &self.counter);
        if spec.default_tti.is_some() {
            debug!(cache = %name, "Native backend ignores time-to-idle");
        }

        let store = TtlStore::new(name, spec.limit, spec.default_ttl)
            .with_pressure(self.pressure.clone())
            .with_traversal_limit(self.traversal_limit)
            .with_integrity(self.integrity);
        Ok(Arc::new(NativeStore::new(store)))
    }

    fn shutdown(&self) {
        let reclaimed = self.pressure.reclaim_all();
        info!(reclaimed, "Native provider shut down");
    }
}

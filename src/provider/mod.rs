//! Provider Module
//!
//! Turns a `CacheSpec` into a live store. Each backend has one provider;
//! the `CacheManager` owns both, records every cache it hands out and tears
//! everything down on shutdown.

mod engine;
mod manager;
mod native;
mod registry;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::BackendKind;
use crate::cache::{CacheKey, CacheValue, Store, MAX_TTL, UNLIMITED};
use crate::error::{CacheError, Result};

pub use engine::MokaProvider;
pub use manager::{CacheManager, ClearListener};
pub use native::NativeProvider;
pub use registry::{CacheInfo, CacheRegistry};

// == Cache Spec ==
/// Requested shape of a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSpec {
    /// Debug name; the provider appends an instance counter
    pub name: String,
    /// Maximum number of entries, `UNLIMITED` for none
    pub limit: usize,
    /// TTL for entries stored without one, None = never expire
    pub default_ttl: Option<Duration>,
    /// Idle timeout, honored by the moka backend only
    pub default_tti: Option<Duration>,
    /// Short-lived cache; reported by the leak audit if it outlives its use
    pub temporary: bool,
}

impl CacheSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            limit: UNLIMITED,
            default_ttl: None,
            default_tti: None,
            temporary: false,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn tti(mut self, tti: Duration) -> Self {
        self.default_tti = Some(tti);
        self
    }

    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    /// Rejects an empty name, a zero limit and durations above `MAX_TTL`.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CacheError::InvalidSpec("cache name is empty".to_string()));
        }
        if self.limit == 0 {
            return Err(CacheError::InvalidSpec(format!(
                "cache '{}' has a limit of 0",
                self.name
            )));
        }
        for (what, duration) in [("TTL", self.default_ttl), ("TTI", self.default_tti)] {
            if let Some(duration) = duration.filter(|d| *d > MAX_TTL) {
                return Err(CacheError::InvalidSpec(format!(
                    "cache '{}' has a default {} of {:?}, above the maximum of {:?}",
                    self.name, what, duration, MAX_TTL
                )));
            }
        }
        Ok(())
    }
}

// == Cache Provider ==
/// Factory for the stores of one backend.
pub trait CacheProvider: Send + Sync {
    /// Concrete store type handed out
    type Handle<K: CacheKey, V: CacheValue>: Store<K, V> + 'static;

    fn kind(&self) -> BackendKind;

    /// Validates `spec` and builds a uniquely named store for it.
    fn get_store<K: CacheKey, V: CacheValue>(
        &self,
        spec: &CacheSpec,
    ) -> Result<Arc<Self::Handle<K, V>>>;

    /// Releases backend-wide resources. Stores already handed out stay
    /// usable only as far as the backend allows.
    fn shutdown(&self);
}

/// `"{name}#{n}"` with `n` taken from `counter`, starting at 1.
fn instance_name(name: &str, counter: &AtomicU64) -> String {
    let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{}#{}", name, n)
}

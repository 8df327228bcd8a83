//! Known-Cache Registry
//!
//! Weak back-references to every cache the manager handed out. Owners keep
//! their caches alive; the registry only observes them, pruning entries
//! whose cache was dropped or closed.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::backend::BackendKind;
use crate::cache::{KnownCache, UNLIMITED};

/// Diagnostic snapshot of one known cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
    pub name: String,
    pub backend: BackendKind,
    pub size: usize,
    /// None when unlimited
    pub limit: Option<usize>,
    pub default_ttl_ms: Option<u64>,
    pub temporary: bool,
    pub created_at: DateTime<Utc>,
}

struct Registration {
    cache: Weak<dyn KnownCache>,
    temporary: bool,
    created_at: DateTime<Utc>,
    registered: Instant,
}

/// A live cache together with its registration data.
struct Live {
    cache: Arc<dyn KnownCache>,
    temporary: bool,
    created_at: DateTime<Utc>,
    registered: Instant,
}

impl Live {
    fn info(&self) -> CacheInfo {
        let limit = self.cache.limit();
        CacheInfo {
            name: self.cache.name().to_string(),
            backend: self.cache.backend(),
            size: self.cache.len(),
            limit: (limit != UNLIMITED).then_some(limit),
            default_ttl_ms: self
                .cache
                .default_ttl()
                .map(|ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
            temporary: self.temporary,
            created_at: self.created_at,
        }
    }
}

#[derive(Default)]
pub struct CacheRegistry {
    registrations: Mutex<Vec<Registration>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, cache: Weak<dyn KnownCache>, temporary: bool) {
        self.registrations.lock().push(Registration {
            cache,
            temporary,
            created_at: Utc::now(),
            registered: Instant::now(),
        });
    }

    /// Upgrades every live, open cache, dropping the rest from the registry.
    ///
    /// The registry lock is released before the caller touches any cache.
    fn live(&self) -> Vec<Live> {
        let mut registrations = self.registrations.lock();
        let mut live = Vec::with_capacity(registrations.len());
        registrations.retain(|registration| match registration.cache.upgrade() {
            Some(cache) if !cache.is_closed() => {
                live.push(Live {
                    cache,
                    temporary: registration.temporary,
                    created_at: registration.created_at,
                    registered: registration.registered,
                });
                true
            }
            _ => false,
        });
        live
    }

    /// Number of live, open caches.
    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `visit` on every live, open cache.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&dyn KnownCache),
    {
        for live in self.live() {
            visit(live.cache.as_ref());
        }
    }

    pub fn snapshot(&self) -> Vec<CacheInfo> {
        self.live().iter().map(Live::info).collect()
    }

    /// Temporary caches still open after `age`.
    pub fn temporaries_older_than(&self, age: Duration) -> Vec<CacheInfo> {
        let now = Instant::now();
        self.live()
            .iter()
            .filter(|live| live.temporary && now.duration_since(live.registered) >= age)
            .map(Live::info)
            .collect()
    }
}

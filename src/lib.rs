//! softcache - In-process cache subsystem
//!
//! Pluggable key/value caches with LRU eviction, per-entry TTL and values
//! reclaimable under memory pressure, backed either natively or by moka,
//! plus a single-flight loading cache on top.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod loading;
pub mod provider;
pub mod tasks;

pub use backend::BackendKind;
pub use cache::{KnownCache, Store, StringKeyStore, UNLIMITED};
pub use config::Config;
pub use error::{CacheError, Result};
pub use loading::{BlockingCache, Loaded};
pub use provider::{CacheInfo, CacheManager, CacheSpec};
pub use tasks::spawn_housekeeping_task;

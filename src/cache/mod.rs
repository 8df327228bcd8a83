//! Cache Module
//!
//! Provides the in-process stores: the LRU-ordered entry store, a
//! capacity-limited map, and the TTL store with reclaimable values.

mod entry;
mod limited;
mod lru;
mod soft;
mod store;
mod traits;

#[cfg(test)]
mod property_tests;

use std::time::Duration;

// Re-export public types
pub use entry::TtlEntry;
pub use limited::LimitedStore;
pub use lru::{ChainCorruption, EntryStore};
pub use soft::{MemoryPressure, ReclaimQueue, SoftValue};
pub use store::{validate_ttl, IntegrityMode, TtlStore};
pub use traits::{CacheKey, CacheValue, KnownCache, Store, StringKeyStore};

// == Public Constants ==
/// Limit value meaning "no bound on the number of entries"
pub const UNLIMITED: usize = usize::MAX;

pub const SECOND: Duration = Duration::from_secs(1);
pub const MINUTE: Duration = Duration::from_secs(60);
pub const HOUR: Duration = Duration::from_secs(60 * 60);
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);
pub const YEAR: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Hard ceiling for any time-to-live or time-to-idle. Larger values are
/// rejected, never clamped.
pub const MAX_TTL: Duration = YEAR;

/// Maximum number of chain nodes a single traversal may visit before the
/// chain is treated as corrupt
pub const DEFAULT_TRAVERSAL_LIMIT: usize = 1_000_000;

/// Number of keys captured in a corruption report
pub const CORRUPTION_DUMP_KEYS: usize = 20;

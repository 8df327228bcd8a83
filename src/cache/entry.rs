//! Cache Entry Module
//!
//! Defines the payload of a TTL store entry: a reclaimable value plus an
//! optional absolute expiration.

use std::time::{Duration, Instant};

use crate::cache::SoftValue;

// == TTL Entry ==
/// A reclaimable value with an optional absolute expiration.
#[derive(Debug)]
pub struct TtlEntry<K, V> {
    /// The stored value
    pub value: SoftValue<K, V>,
    /// Creation instant
    pub created_at: Instant,
    /// Expiration instant, None = no expiration
    pub expires_at: Option<Instant>,
}

impl<K: Clone, V> TtlEntry<K, V> {
    // == Constructor ==
    /// Creates an entry expiring `ttl` from now.
    ///
    /// A TTL too large to represent as an instant means no expiration.
    pub fn new(value: SoftValue<K, V>, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
        }
    }

    // == Is Expired ==
    /// Checks if the entry is gone, either because its value was reclaimed or
    /// because the current time is at or past the expiration instant.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Same as `is_expired` against a fixed instant, for scans that check many
    /// entries at once.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.value.is_reclaimed() || self.expires_at.is_some_and(|expires| now >= expires)
    }

    // == Time To Live ==
    /// Returns the remaining lifetime, or None if no expiration is set.
    ///
    /// - `Some(Duration::ZERO)` once expired
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires| expires.saturating_duration_since(Instant::now()))
    }
}

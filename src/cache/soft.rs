//! Reclaimable Values Module
//!
//! Values in a `TtlStore` are held through `SoftValue` slots. A shared
//! `MemoryPressure` coordinator may clear any registered slot when the host
//! signals memory pressure or when the live-value budget is exceeded. A
//! cleared slot posts its key to the owning store's `ReclaimQueue`; the store
//! drops the dead entry on its next put, or on the next lookup of that key.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

/// Registrations kept before dead slots are pruned from the pressure queue
const PRUNE_FLOOR: usize = 1024;

trait Reclaim: Send + Sync {
    /// Clears the value and notifies the owning store. Returns `false` if the
    /// value was already gone.
    fn reclaim(&self) -> bool;
}

// == Reclaim Queue ==
/// Notification queue of keys whose values were reclaimed.
pub struct ReclaimQueue<K> {
    keys: Arc<Mutex<VecDeque<K>>>,
}

impl<K> ReclaimQueue<K> {
    pub fn new() -> Self {
        Self {
            keys: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Takes every pending notification.
    pub fn drain(&self) -> Vec<K> {
        self.keys.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }
}

impl<K> Default for ReclaimQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> std::fmt::Debug for ReclaimQueue<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReclaimQueue")
            .field("pending", &self.len())
            .finish()
    }
}

// == Memory Pressure ==
/// Process-level coordinator for reclaimable values.
///
/// Cloning yields another handle to the same coordinator. Slots are reclaimed
/// oldest registration first.
#[derive(Clone, Default)]
pub struct MemoryPressure {
    inner: Arc<PressureInner>,
}

#[derive(Default)]
struct PressureInner {
    tracked: Mutex<VecDeque<Weak<dyn Reclaim>>>,
    /// Registered slots still holding a value
    held: AtomicUsize,
    /// Upper bound for `held`, if any
    budget: Option<usize>,
}

impl MemoryPressure {
    /// Creates a coordinator that only reclaims when told to.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a coordinator that also reclaims the oldest values whenever more
    /// than `budget` values are live.
    pub fn with_budget(budget: usize) -> Self {
        Self {
            inner: Arc::new(PressureInner {
                budget: Some(budget),
                ..PressureInner::default()
            }),
        }
    }

    pub fn budget(&self) -> Option<usize> {
        self.inner.budget
    }

    /// Number of registered values not yet reclaimed or released.
    pub fn held(&self) -> usize {
        self.inner.held.load(Ordering::Acquire)
    }

    // == Reclaim ==
    /// Host pressure signal: clears up to `max` of the oldest live values.
    ///
    /// Returns the number of values cleared.
    pub fn reclaim(&self, max: usize) -> usize {
        let mut tracked = self.inner.tracked.lock();
        let mut cleared = 0;
        while cleared < max {
            let Some(weak) = tracked.pop_front() else {
                break;
            };
            if let Some(slot) = weak.upgrade() {
                if slot.reclaim() {
                    cleared += 1;
                }
            }
        }
        drop(tracked);

        if cleared > 0 {
            debug!(cleared, "Reclaimed values under memory pressure");
        }
        cleared
    }

    /// Clears every live value.
    pub fn reclaim_all(&self) -> usize {
        self.reclaim(usize::MAX)
    }

    fn register(&self, slot: Weak<dyn Reclaim>) {
        let held = self.inner.held.fetch_add(1, Ordering::AcqRel) + 1;
        let mut tracked = self.inner.tracked.lock();
        tracked.push_back(slot);

        if tracked.len() > PRUNE_FLOOR && tracked.len() > held.saturating_mul(2) {
            tracked.retain(|weak| weak.strong_count() > 0);
        }

        if let Some(budget) = self.inner.budget {
            while self.held() > budget {
                let Some(weak) = tracked.pop_front() else {
                    break;
                };
                if let Some(slot) = weak.upgrade() {
                    slot.reclaim();
                }
            }
        }
    }

    fn release_one(&self) {
        self.inner.held.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for MemoryPressure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPressure")
            .field("held", &self.held())
            .field("budget", &self.inner.budget)
            .finish()
    }
}

// == Soft Value ==
struct SoftSlot<K, V> {
    value: Mutex<Option<V>>,
    key: K,
    queue: Weak<Mutex<VecDeque<K>>>,
    pressure: Option<MemoryPressure>,
}

impl<K: Clone, V> SoftSlot<K, V> {
    fn take(&self, notify: bool) -> bool {
        if self.value.lock().take().is_none() {
            return false;
        }
        if let Some(pressure) = &self.pressure {
            pressure.release_one();
        }
        if notify {
            if let Some(queue) = self.queue.upgrade() {
                queue.lock().push_back(self.key.clone());
            }
        }
        true
    }
}

impl<K, V> Reclaim for SoftSlot<K, V>
where
    K: Clone + Send + Sync,
    V: Send,
{
    fn reclaim(&self) -> bool {
        self.take(true)
    }
}

impl<K, V> Drop for SoftSlot<K, V> {
    fn drop(&mut self) {
        if self.value.get_mut().is_some() {
            if let Some(pressure) = &self.pressure {
                pressure.release_one();
            }
        }
    }
}

/// A value that may be cleared under memory pressure independently of its
/// entry being removed.
pub struct SoftValue<K, V> {
    slot: Arc<SoftSlot<K, V>>,
}

impl<K, V> SoftValue<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    // == Constructor ==
    /// Wraps `value` for `key`, reporting reclamation to `queue` and, when
    /// given, registering with the `pressure` coordinator.
    pub fn new(
        key: K,
        value: V,
        queue: &ReclaimQueue<K>,
        pressure: Option<&MemoryPressure>,
    ) -> Self {
        let slot = Arc::new(SoftSlot {
            value: Mutex::new(Some(value)),
            key,
            queue: Arc::downgrade(&queue.keys),
            pressure: pressure.cloned(),
        });
        if let Some(pressure) = pressure {
            let weak: Weak<dyn Reclaim> = Arc::downgrade(&slot) as Weak<SoftSlot<K, V>>;
            pressure.register(weak);
        }
        Self { slot }
    }
}

impl<K: Clone, V> SoftValue<K, V> {
    /// Returns a copy of the value unless it was reclaimed or released.
    pub fn get(&self) -> Option<V>
    where
        V: Clone,
    {
        self.slot.value.lock().clone()
    }

    pub fn is_reclaimed(&self) -> bool {
        self.slot.value.lock().is_none()
    }

    /// Clears the value as memory pressure would, notifying the store.
    pub fn reclaim(&self) -> bool {
        self.slot.take(true)
    }

    /// Drops the value eagerly without notifying the store.
    pub fn release(&self) {
        self.slot.take(false);
    }
}

impl<K, V> std::fmt::Debug for SoftValue<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftValue")
            .field("reclaimed", &self.slot.value.lock().is_none())
            .finish()
    }
}

//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the stores against a simple reference model and
//! against the capacity, recency and bulk-removal properties.

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use crate::backend::NativeStore;
use crate::cache::{EntryStore, LimitedStore, Store, TtlStore, UNLIMITED};

// == Test Configuration ==
const TEST_LIMIT: usize = 8;

// == Strategies ==
/// Keys drawn from a small alphabet so operations collide often
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-j]{1,2}"
}

fn value_strategy() -> impl Strategy<Value = u32> {
    any::<u32>()
}

#[derive(Debug, Clone)]
enum CacheOp {
    Put { key: String, value: u32 },
    Get { key: String },
    Remove { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        3 => (key_strategy(), value_strategy())
            .prop_map(|(key, value)| CacheOp::Put { key, value }),
        2 => key_strategy().prop_map(|key| CacheOp::Get { key }),
        1 => key_strategy().prop_map(|key| CacheOp::Remove { key }),
    ]
}

// == Reference Model ==
/// Most recently used first.
#[derive(Debug, Default)]
struct LruModel {
    entries: Vec<(String, u32)>,
    limit: usize,
}

impl LruModel {
    fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit,
        }
    }

    fn put(&mut self, key: String, value: u32) {
        self.entries.retain(|(k, _)| *k != key);
        self.entries.insert(0, (key, value));
        self.entries.truncate(self.limit);
    }

    fn get(&mut self, key: &str) -> Option<u32> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        let entry = self.entries.remove(index);
        let value = entry.1;
        self.entries.insert(0, entry);
        Some(value)
    }

    fn remove(&mut self, key: &str) -> Option<u32> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }
}

fn dedup(keys: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Any operation sequence leaves the limited store identical to the model,
    // in content and in recency order.
    #[test]
    fn prop_limited_store_matches_model(
        ops in prop::collection::vec(cache_op_strategy(), 1..100),
        limit in 1usize..TEST_LIMIT,
    ) {
        let mut store = LimitedStore::new(limit);
        let mut model = LruModel::new(limit);

        for op in ops {
            match op {
                CacheOp::Put { key, value } => {
                    store.put(key.clone(), value);
                    model.put(key, value);
                }
                CacheOp::Get { key } => {
                    prop_assert_eq!(store.get(key.as_str()).copied(), model.get(&key));
                }
                CacheOp::Remove { key } => {
                    prop_assert_eq!(store.remove(key.as_str()), model.remove(&key));
                }
            }
            prop_assert!(store.len() <= limit, "Size exceeded the limit");
            prop_assert_eq!(store.len(), model.entries.len());
        }
    }

    // The TTL store without expiration behaves like the same LRU model.
    #[test]
    fn prop_ttl_store_matches_model(
        ops in prop::collection::vec(cache_op_strategy(), 1..100),
        limit in 1usize..TEST_LIMIT,
    ) {
        let mut store: TtlStore<String, u32> = TtlStore::new("prop", limit, None);
        let mut model = LruModel::new(limit);

        for op in ops {
            match op {
                CacheOp::Put { key, value } => {
                    store.put(key.clone(), value);
                    model.put(key, value);
                }
                CacheOp::Get { key } => {
                    prop_assert_eq!(store.get(key.as_str()), model.get(&key));
                }
                CacheOp::Remove { key } => {
                    prop_assert_eq!(store.remove(key.as_str()), model.remove(&key));
                }
            }
        }

        prop_assert_eq!(store.keys(), model.keys());
    }

    #[test]
    fn prop_roundtrip_storage(key in key_strategy(), value in value_strategy()) {
        let mut store: TtlStore<String, u32> = TtlStore::new("prop", UNLIMITED, None);

        store.put(key.clone(), value);

        prop_assert_eq!(store.get(key.as_str()), Some(value));
    }

    #[test]
    fn prop_overwrite_semantics(
        key in key_strategy(),
        first in value_strategy(),
        second in value_strategy(),
    ) {
        let mut store: TtlStore<String, u32> = TtlStore::new("prop", UNLIMITED, None);

        store.put(key.clone(), first);
        store.put(key.clone(), second);

        prop_assert_eq!(store.get(key.as_str()), Some(second));
        prop_assert_eq!(store.len(), 1);
    }

    #[test]
    fn prop_remove_deletes_entry(key in key_strategy(), value in value_strategy()) {
        let mut store: TtlStore<String, u32> = TtlStore::new("prop", UNLIMITED, None);
        store.put(key.clone(), value);

        prop_assert_eq!(store.remove(key.as_str()), Some(value));
        prop_assert_eq!(store.get(key.as_str()), None);
        prop_assert!(store.is_empty());
    }

    // Filling to the limit and adding one more key evicts the oldest key.
    #[test]
    fn prop_lru_eviction_order(keys in prop::collection::vec(key_strategy(), 2..12)) {
        let keys = dedup(keys);
        prop_assume!(keys.len() >= 3);

        let (initial, newest) = keys.split_at(keys.len() - 1);
        let mut store: TtlStore<String, u32> = TtlStore::new("prop", initial.len(), None);
        for key in initial {
            store.put(key.clone(), 0);
        }

        store.put(newest[0].clone(), 1);

        prop_assert_eq!(store.len(), initial.len());
        prop_assert_eq!(store.get(initial[0].as_str()), None, "Oldest key should be evicted");
        prop_assert_eq!(store.get(newest[0].as_str()), Some(1));
        for key in &initial[1..] {
            prop_assert!(store.get(key.as_str()).is_some(), "Key '{}' should remain", key);
        }
    }

    // A read makes the key most recent, so the next oldest is evicted instead.
    #[test]
    fn prop_lru_access_tracking(keys in prop::collection::vec(key_strategy(), 3..12)) {
        let keys = dedup(keys);
        prop_assume!(keys.len() >= 4);

        let (initial, newest) = keys.split_at(keys.len() - 1);
        let mut store: TtlStore<String, u32> = TtlStore::new("prop", initial.len(), None);
        for key in initial {
            store.put(key.clone(), 0);
        }

        prop_assert!(store.get(initial[0].as_str()).is_some());
        store.put(newest[0].clone(), 1);

        prop_assert!(store.get(initial[0].as_str()).is_some(), "Accessed key should remain");
        prop_assert_eq!(store.get(initial[1].as_str()), None, "Next oldest should be evicted");
    }

    // remove_where removes exactly the matching keys and counts them.
    #[test]
    fn prop_remove_where_correctness(
        keys in prop::collection::vec(key_strategy(), 0..40),
        prefix in "[a-j]",
    ) {
        let keys = dedup(keys);
        let mut store: TtlStore<String, u32> = TtlStore::new("prop", UNLIMITED, None);
        for key in &keys {
            store.put(key.clone(), 0);
        }
        let expected: HashSet<String> =
            keys.iter().filter(|k| !k.starts_with(&prefix)).cloned().collect();

        let removed = store.remove_where(|key| key.starts_with(&prefix));

        prop_assert_eq!(removed, keys.len() - expected.len());
        prop_assert_eq!(store.keys().into_iter().collect::<HashSet<_>>(), expected);
    }

    // The chain walk, the bounded iterator and the index always agree.
    #[test]
    fn prop_entry_store_chain_is_consistent(
        ops in prop::collection::vec(cache_op_strategy(), 1..100),
    ) {
        let mut store: EntryStore<String, u32> = EntryStore::new();

        for op in ops {
            match op {
                CacheOp::Put { key, value } => {
                    store.insert(key, value);
                }
                CacheOp::Get { key } => {
                    store.find(key.as_str());
                }
                CacheOp::Remove { key } => {
                    store.remove(key.as_str());
                }
            }
            store.debug_validate_invariants();
        }

        let mut walked = Vec::new();
        let visited = store.traverse(UNLIMITED, |key, _| walked.push(key.clone()));
        let iterated: Vec<String> = store.iter().map(|(key, _)| key.clone()).collect();

        prop_assert_eq!(visited.ok(), Some(store.len()));
        prop_assert_eq!(walked, iterated);
    }

    // Concurrent readers only ever see values some writer stored.
    #[test]
    fn prop_concurrent_operation_correctness(
        initial in prop::collection::vec((key_strategy(), value_strategy()), 1..20),
        writes in prop::collection::vec((key_strategy(), value_strategy()), 1..50),
    ) {
        let store: Arc<dyn Store<String, u32>> =
            Arc::new(NativeStore::new(TtlStore::new("prop", UNLIMITED, None)));
        for (key, value) in &initial {
            store.put(key.clone(), *value);
        }
        let written: HashSet<(String, u32)> =
            initial.iter().chain(writes.iter()).cloned().collect();

        thread::scope(|scope| {
            for chunk in writes.chunks(10) {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for (key, value) in chunk {
                        store.put(key.clone(), *value);
                    }
                });
            }
            for _ in 0..4 {
                let store = Arc::clone(&store);
                let written = &written;
                scope.spawn(move || {
                    for (key, _) in written {
                        if let Some(value) = store.get(key) {
                            assert!(written.contains(&(key.clone(), value)));
                        }
                    }
                });
            }
        });

        prop_assert_eq!(store.len(), store.keys().len());
    }
}

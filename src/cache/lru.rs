//! LRU Entry Store Module
//!
//! Hash-indexed entries kept on a circular doubly linked list anchored at a
//! sentinel head. Nodes live in an arena and link to each other by index.
//!
//! ```text
//!   head ─► [MRU] ◄──► ... ◄──► [LRU] ─► head
//! ```
//!
//! - Front (after head) = Most recently used
//! - Back (before head) = Least recently used

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::mem;

use crate::cache::CORRUPTION_DUMP_KEYS;

/// Arena slot of the sentinel head
const HEAD: usize = 0;

#[derive(Debug)]
struct Node<K, E> {
    /// `None` for the sentinel and for freed slots
    slot: Option<(K, E)>,
    prev: usize,
    next: usize,
}

impl<K, E> Node<K, E> {
    fn sentinel() -> Self {
        Self {
            slot: None,
            prev: HEAD,
            next: HEAD,
        }
    }
}

// == Chain Corruption ==
/// Report produced when a bounded traversal does not find its way back to
/// the head sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainCorruption<K> {
    /// Nodes visited before the traversal was aborted
    pub visited: usize,
    /// Keys found at the point of abort, at most `CORRUPTION_DUMP_KEYS`
    pub sample: Vec<K>,
}

// == Entry Store ==
/// Ordered key/entry collection with O(1) lookup, touch and LRU removal.
///
/// Not synchronized: callers serialize access (see `NativeStore`). No growth
/// bound is enforced here; the owning store decides what to evict.
#[derive(Debug)]
pub struct EntryStore<K, E> {
    nodes: Vec<Node<K, E>>,
    free: Vec<usize>,
    index: HashMap<K, usize>,
}

impl<K, E> Default for EntryStore<K, E>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, E> EntryStore<K, E> {
    // == Length ==
    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl<K, E> EntryStore<K, E>
where
    K: Hash + Eq + Clone,
{
    // == Constructor ==
    /// Creates an empty store holding only the head sentinel.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::sentinel()],
            free: Vec::new(),
            index: HashMap::new(),
        }
    }

    // == Contains ==
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    // == Find ==
    /// Looks up an entry and marks it most recently used.
    pub fn find<Q>(&mut self, key: &Q) -> Option<&mut E>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let i = *self.index.get(key)?;
        self.touch(i);
        self.nodes[i].slot.as_mut().map(|(_, entry)| entry)
    }

    // == Peek ==
    /// Looks up an entry without changing its position.
    pub fn peek<Q>(&self, key: &Q) -> Option<&E>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let i = *self.index.get(key)?;
        self.nodes[i].slot.as_ref().map(|(_, entry)| entry)
    }

    // == Insert ==
    /// Inserts or updates an entry and marks it most recently used.
    ///
    /// Returns the previous entry for the key, if any.
    pub fn insert(&mut self, key: K, entry: E) -> Option<E> {
        if let Some(&i) = self.index.get(&key) {
            self.touch(i);
            return self.nodes[i]
                .slot
                .as_mut()
                .map(|(_, old)| mem::replace(old, entry));
        }

        let node = Node {
            slot: Some((key.clone(), entry)),
            prev: HEAD,
            next: HEAD,
        };
        let i = match self.free.pop() {
            Some(i) => {
                self.nodes[i] = node;
                i
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        self.link_front(i);
        self.index.insert(key, i);
        None
    }

    // == Remove ==
    /// Removes an entry by key.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<E>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let i = self.index.remove(key)?;
        self.detach(i).map(|(_, entry)| entry)
    }

    // == Least Recently Used ==
    /// Returns the entry immediately before the head sentinel.
    pub fn lru(&self) -> Option<(&K, &E)> {
        let i = self.nodes[HEAD].prev;
        if i == HEAD {
            return None;
        }
        self.nodes[i].slot.as_ref().map(|(key, entry)| (key, entry))
    }

    // == Remove LRU If ==
    /// Removes the least recently used entry if `accept` agrees.
    pub fn remove_lru_if<F>(&mut self, accept: F) -> Option<(K, E)>
    where
        F: FnOnce(&K, &E) -> bool,
    {
        let i = self.nodes[HEAD].prev;
        if i == HEAD {
            return None;
        }
        let eligible = self.nodes[i]
            .slot
            .as_ref()
            .is_some_and(|(key, entry)| accept(key, entry));
        if !eligible {
            return None;
        }
        let (key, entry) = self.detach(i)?;
        self.index.remove(&key);
        Some((key, entry))
    }

    // == Pop LRU ==
    /// Unconditionally removes the least recently used entry.
    pub fn pop_lru(&mut self) -> Option<(K, E)> {
        self.remove_lru_if(|_, _| true)
    }

    // == Traverse ==
    /// Visits entries from most to least recently used, following the chain.
    ///
    /// Visits at most `limit` nodes. A chain that has not returned to the head
    /// by then, or that leads into a freed slot, is reported as corrupt along
    /// with a sample of the keys found from the point of abort.
    pub fn traverse<F>(&self, limit: usize, mut visit: F) -> Result<usize, ChainCorruption<K>>
    where
        F: FnMut(&K, &E),
    {
        let mut visited = 0;
        let mut cursor = self.nodes[HEAD].next;

        while cursor != HEAD {
            let slot = match self.nodes.get(cursor).and_then(|n| n.slot.as_ref()) {
                Some(slot) if visited < limit => slot,
                _ => {
                    return Err(ChainCorruption {
                        visited,
                        sample: self.sample_from(cursor),
                    })
                }
            };
            visit(&slot.0, &slot.1);
            visited += 1;
            cursor = self.nodes[cursor].next;
        }

        Ok(visited)
    }

    // == Iterate ==
    /// Iterates entries from most to least recently used.
    ///
    /// Stops after `len()` entries even if the chain does not.
    pub fn iter(&self) -> Iter<'_, K, E> {
        Iter {
            store: self,
            cursor: self.nodes[HEAD].next,
            remaining: self.len(),
        }
    }

    // == Clear ==
    /// Drops every entry and resets the chain to the bare sentinel.
    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        self.nodes[HEAD] = Node::sentinel();
        self.free.clear();
        self.index.clear();
    }

    fn touch(&mut self, i: usize) {
        if self.nodes[HEAD].next != i {
            self.unlink(i);
            self.link_front(i);
        }
    }

    fn link_front(&mut self, i: usize) {
        let first = self.nodes[HEAD].next;
        self.nodes[i].prev = HEAD;
        self.nodes[i].next = first;
        self.nodes[first].prev = i;
        self.nodes[HEAD].next = i;
    }

    fn unlink(&mut self, i: usize) {
        let (prev, next) = (self.nodes[i].prev, self.nodes[i].next);
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
    }

    /// Unlinks a node and returns its slot to the free list. The index entry
    /// is left to the caller.
    fn detach(&mut self, i: usize) -> Option<(K, E)> {
        self.unlink(i);
        let slot = self.nodes[i].slot.take();
        self.nodes[i].prev = HEAD;
        self.nodes[i].next = HEAD;
        self.free.push(i);
        slot
    }

    fn sample_from(&self, start: usize) -> Vec<K> {
        let mut sample = Vec::with_capacity(CORRUPTION_DUMP_KEYS);
        let mut cursor = start;
        while sample.len() < CORRUPTION_DUMP_KEYS && cursor != HEAD {
            let Some(node) = self.nodes.get(cursor) else {
                break;
            };
            if let Some((key, _)) = &node.slot {
                sample.push(key.clone());
            }
            cursor = node.next;
        }
        sample
    }

    /// Checks link symmetry and that the chain covers exactly the indexed
    /// entries.
    #[cfg(test)]
    pub(crate) fn debug_validate_invariants(&self) {
        let mut count = 0;
        let mut cursor = self.nodes[HEAD].next;
        let mut prev = HEAD;
        while cursor != HEAD {
            assert_eq!(self.nodes[cursor].prev, prev, "broken back link");
            let (key, _) = self.nodes[cursor].slot.as_ref().expect("freed node in chain");
            assert_eq!(self.index.get(key), Some(&cursor), "index out of sync");
            count += 1;
            assert!(count <= self.index.len(), "chain longer than index");
            prev = cursor;
            cursor = self.nodes[cursor].next;
        }
        assert_eq!(self.nodes[HEAD].prev, prev, "tail does not close the ring");
        assert_eq!(count, self.index.len(), "chain shorter than index");
    }

    /// Closes the chain into a loop that skips the head sentinel.
    #[cfg(test)]
    pub(crate) fn corrupt_into_cycle(&mut self) {
        let lru = self.nodes[HEAD].prev;
        let mru = self.nodes[HEAD].next;
        if lru != HEAD {
            self.nodes[lru].next = mru;
        }
    }
}

// == Iterator ==
pub struct Iter<'a, K, E> {
    store: &'a EntryStore<K, E>,
    cursor: usize,
    remaining: usize,
}

impl<'a, K, E> Iterator for Iter<'a, K, E> {
    type Item = (&'a K, &'a E);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.cursor == HEAD {
            return None;
        }
        let node = self.store.nodes.get(self.cursor)?;
        self.cursor = node.next;
        self.remaining -= 1;
        node.slot.as_ref().map(|(key, entry)| (key, entry))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn keys_in_order(store: &EntryStore<String, u32>) -> Vec<String> {
        store.iter().map(|(k, _)| k.clone()).collect()
    }

    fn store_with(keys: &[&str]) -> EntryStore<String, u32> {
        let mut store = EntryStore::new();
        for (i, key) in keys.iter().enumerate() {
            store.insert(key.to_string(), i as u32);
        }
        store
    }

    #[test]
    fn test_store_new() {
        let store: EntryStore<String, u32> = EntryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert!(store.lru().is_none());
        store.debug_validate_invariants();
    }

    #[test]
    fn test_len_needs_no_key_bounds() {
        fn occupancy<K, E>(store: &EntryStore<K, E>) -> (usize, bool) {
            (store.len(), store.is_empty())
        }

        let store = store_with(&["key1", "key2"]);

        assert_eq!(occupancy(&store), (2, false));
    }

    #[test]
    fn test_insert_orders_most_recent_first() {
        let store = store_with(&["key1", "key2", "key3"]);

        assert_eq!(store.len(), 3);
        assert_eq!(keys_in_order(&store), vec!["key3", "key2", "key1"]);
        // key1 is oldest (added first)
        assert_eq!(store.lru().map(|(k, _)| k.as_str()), Some("key1"));
        store.debug_validate_invariants();
    }

    #[test]
    fn test_insert_existing_key_updates_and_touches() {
        let mut store = store_with(&["key1", "key2", "key3"]);

        let old = store.insert("key1".to_string(), 42);

        assert_eq!(old, Some(0));
        assert_eq!(store.len(), 3);
        assert_eq!(store.peek("key1"), Some(&42));
        // key2 is now oldest
        assert_eq!(store.lru().map(|(k, _)| k.as_str()), Some("key2"));
        store.debug_validate_invariants();
    }

    #[test]
    fn test_find_moves_to_front() {
        let mut store = store_with(&["a", "b", "c"]);

        assert_eq!(store.find("a").copied(), Some(0));

        assert_eq!(keys_in_order(&store), vec!["a", "c", "b"]);
        assert_eq!(store.pop_lru().map(|(k, _)| k), Some("b".to_string()));
        store.debug_validate_invariants();
    }

    #[test]
    fn test_peek_does_not_touch() {
        let mut store = store_with(&["a", "b"]);

        assert_eq!(store.peek("a"), Some(&0));
        assert_eq!(store.pop_lru().map(|(k, _)| k), Some("a".to_string()));
    }

    #[test]
    fn test_find_missing_key() {
        let mut store = store_with(&["a"]);
        assert!(store.find("missing").is_none());
        assert_eq!(keys_in_order(&store), vec!["a"]);
    }

    #[test]
    fn test_pop_lru_order() {
        let mut store = store_with(&["a", "b", "c"]);

        // touch(a): [a, c, b]; touch(c): [c, a, b]; touch(b): [b, c, a]
        store.find("a");
        store.find("c");
        store.find("b");

        assert_eq!(store.pop_lru().map(|(k, _)| k), Some("a".to_string()));
        assert_eq!(store.pop_lru().map(|(k, _)| k), Some("c".to_string()));
        assert_eq!(store.pop_lru().map(|(k, _)| k), Some("b".to_string()));
        assert!(store.pop_lru().is_none());
        assert!(store.is_empty());
        store.debug_validate_invariants();
    }

    #[test]
    fn test_remove_lru_if_respects_predicate() {
        let mut store = store_with(&["a", "b"]);

        assert!(store.remove_lru_if(|_, v| *v > 10).is_none());
        assert_eq!(store.len(), 2);

        let removed = store.remove_lru_if(|k, _| k == "a");
        assert_eq!(removed, Some(("a".to_string(), 0)));
        assert_eq!(store.len(), 1);
        store.debug_validate_invariants();
    }

    #[test]
    fn test_remove_middle_entry() {
        let mut store = store_with(&["key1", "key2", "key3"]);

        assert_eq!(store.remove("key2"), Some(1));
        assert_eq!(store.remove("key2"), None);

        assert_eq!(store.len(), 2);
        assert!(!store.contains("key2"));
        assert_eq!(keys_in_order(&store), vec!["key3", "key1"]);
        store.debug_validate_invariants();
    }

    #[test]
    fn test_freed_slots_are_reused() {
        let mut store = store_with(&["a", "b", "c"]);
        store.remove("b");
        store.insert("d".to_string(), 9);

        assert_eq!(store.nodes.len(), 4);
        assert_eq!(keys_in_order(&store), vec!["d", "c", "a"]);
        store.debug_validate_invariants();
    }

    #[test]
    fn test_clear_resets_chain() {
        let mut store = store_with(&["a", "b", "c"]);
        store.clear();

        assert!(store.is_empty());
        assert!(store.lru().is_none());
        store.insert("z".to_string(), 1);
        assert_eq!(keys_in_order(&store), vec!["z"]);
        store.debug_validate_invariants();
    }

    #[test]
    fn test_traverse_visits_every_entry() {
        let store = store_with(&["a", "b", "c"]);
        let mut seen = Vec::new();

        let visited = store.traverse(10, |k, _| seen.push(k.clone())).unwrap();

        assert_eq!(visited, 3);
        assert_eq!(seen, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_traverse_detects_cycle() {
        let mut store = store_with(&["a", "b", "c", "d"]);
        store.corrupt_into_cycle();

        let err = store.traverse(100, |_, _| {}).unwrap_err();

        assert_eq!(err.visited, 100);
        assert!(!err.sample.is_empty());
        assert!(err.sample.len() <= CORRUPTION_DUMP_KEYS);
    }

    #[test]
    fn test_traverse_limit_below_len_reports_overrun() {
        let store = store_with(&["a", "b", "c"]);

        let err = store.traverse(2, |_, _| {}).unwrap_err();

        assert_eq!(err.visited, 2);
        assert_eq!(err.sample, vec!["a".to_string()]);
    }

    #[test]
    fn test_iter_is_bounded_by_len_on_cycle() {
        let mut store = store_with(&["a", "b", "c"]);
        store.corrupt_into_cycle();

        assert_eq!(store.iter().count(), 3);
    }
}

//! Access Order Module
//!
//! Tracks last-access stamps for LRU eviction.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

// == Access Order ==
/// Maps each key to its last-access stamp.
///
/// Stamps come from a monotonic counter ticked on every touch, so no two keys
/// share a stamp and the least recently used key is always unique. A
/// `BTreeMap` keyed by stamp keeps the oldest key at the front.
#[derive(Debug, Default)]
pub struct AccessOrder {
    /// key -> current stamp
    stamps: HashMap<String, u64>,
    /// stamp -> key, ordered oldest first
    order: BTreeMap<u64, String>,
    /// Last stamp handed out
    clock: u64,
}

impl AccessOrder {
    // == Constructor ==
    /// Creates a new empty access order index.
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used, inserting it if new.
    pub fn touch(&mut self, key: &str) {
        self.clock += 1;
        let stamp = self.clock;

        match self.stamps.get_mut(key) {
            Some(previous) => {
                self.order.remove(previous);
                *previous = stamp;
            }
            None => {
                self.stamps.insert(key.to_string(), stamp);
            }
        }
        self.order.insert(stamp, key.to_string());
    }

    // == Remove ==
    /// Removes a key from the index. Returns true if it was tracked.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.stamps.remove(key) {
            Some(stamp) => {
                self.order.remove(&stamp);
                true
            }
            None => false,
        }
    }

    // == Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn oldest(&self) -> Option<&str> {
        self.order.values().next().map(String::as_str)
    }

    /// Current stamp of a key.
    pub fn stamp(&self, key: &str) -> Option<u64> {
        self.stamps.get(key).copied()
    }

    /// Last stamp handed out.
    pub fn last_stamp(&self) -> u64 {
        self.clock
    }

    /// Up to `limit` keys with stamps in `(after, until]`, oldest first.
    pub fn range(&self, after: u64, until: u64, limit: usize) -> Vec<(u64, String)> {
        self.order
            .range((Bound::Excluded(after), Bound::Included(until)))
            .take(limit)
            .map(|(stamp, key)| (*stamp, key.clone()))
            .collect()
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.stamps.clear();
        self.order.clear();
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    /// Checks if a key is being tracked.
    pub fn contains(&self, key: &str) -> bool {
        self.stamps.contains_key(key)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_new() {
        let access = AccessOrder::new();
        assert!(access.is_empty());
        assert_eq!(access.len(), 0);
        assert_eq!(access.oldest(), None);
    }

    #[test]
    fn test_touch_new_keys() {
        let mut access = AccessOrder::new();

        access.touch("key1");
        access.touch("key2");
        access.touch("key3");

        assert_eq!(access.len(), 3);
        assert_eq!(access.oldest(), Some("key1"));
    }

    #[test]
    fn test_touch_existing_key() {
        let mut access = AccessOrder::new();

        access.touch("key1");
        access.touch("key2");
        access.touch("key3");
        access.touch("key1");

        assert_eq!(access.len(), 3);
        assert_eq!(access.oldest(), Some("key2"));
    }

    #[test]
    fn test_stamps_are_monotonic() {
        let mut access = AccessOrder::new();

        access.touch("a");
        let first = access.stamp("a").unwrap();
        access.touch("b");
        access.touch("a");

        assert!(access.stamp("a").unwrap() > first);
        assert!(access.stamp("a").unwrap() > access.stamp("b").unwrap());
    }

    #[test]
    fn test_remove() {
        let mut access = AccessOrder::new();

        access.touch("key1");
        access.touch("key2");
        access.touch("key3");

        assert!(access.remove("key1"));
        assert!(!access.remove("nonexistent"));

        assert_eq!(access.len(), 2);
        assert!(!access.contains("key1"));
        assert_eq!(access.oldest(), Some("key2"));
    }

    #[test]
    fn test_touch_same_key_multiple_times() {
        let mut access = AccessOrder::new();

        access.touch("key1");
        access.touch("key1");
        access.touch("key1");

        assert_eq!(access.len(), 1);
        assert!(access.remove("key1"));
        assert!(access.is_empty());
    }

    #[test]
    fn test_order_after_multiple_touches() {
        let mut access = AccessOrder::new();

        access.touch("a");
        access.touch("b");
        access.touch("c");
        access.touch("a");
        access.touch("c");
        access.touch("b");

        // Most recent first: b, c, a
        assert_eq!(access.oldest(), Some("a"));
        access.remove("a");
        assert_eq!(access.oldest(), Some("c"));
        access.remove("c");
        assert_eq!(access.oldest(), Some("b"));
    }

    #[test]
    fn test_clear() {
        let mut access = AccessOrder::new();
        access.touch("a");
        access.touch("b");
        access.clear();

        assert!(access.is_empty());
        assert_eq!(access.oldest(), None);
    }

    #[test]
    fn test_range_walks_by_stamp() {
        let mut access = AccessOrder::new();
        for key in ["a", "b", "c", "d"] {
            access.touch(key);
        }
        let until = access.last_stamp();
        access.touch("e");

        let first = access.range(0, until, 2);
        assert_eq!(first, vec![(1, "a".to_string()), (2, "b".to_string())]);

        let rest = access.range(2, until, 10);
        assert_eq!(rest, vec![(3, "c".to_string()), (4, "d".to_string())]);
        assert!(access.range(4, until, 10).is_empty());
    }
}

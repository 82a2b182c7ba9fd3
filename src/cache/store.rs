//! Cache Store Module
//!
//! Entry table combined with the access order index and tag membership. The
//! store is synchronous; `CacheHandle` wraps it in a lock and supplies `now`.

use std::collections::{BTreeSet, HashMap};

use glob::Pattern;

use crate::cache::{AccessOrder, CacheEntry, CacheValue, Codec, EncodedValue, TagMembership, TtlStatus};
use crate::error::{CacheError, Result};

/// Result of a read.
#[derive(Debug)]
pub enum GetOutcome {
    Hit(CacheValue),
    Miss,
    /// Entry was stale and has been removed
    Expired,
    /// Entry could not be decoded and has been removed
    Corrupt(CacheError),
}

/// Result of rewriting a TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireOutcome {
    Updated,
    /// Entry was stale and has been removed
    Expired,
    Missing,
}

// == Cache Store ==
/// Main cache storage with LRU eviction and TTL support.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// LRU access tracker
    access: AccessOrder,
    /// tag -> keys
    tags: TagMembership,
    codec: Codec,
    /// Maximum number of entries allowed
    max_size: usize,
    /// Bytes held by keys and encoded values
    memory_bytes: usize,
}

impl CacheStore {
    // == Constructor ==
    pub fn new(max_size: usize, codec: Codec) -> Self {
        Self {
            entries: HashMap::new(),
            access: AccessOrder::new(),
            tags: TagMembership::new(),
            codec,
            max_size,
            memory_bytes: 0,
        }
    }

    // == Get ==
    /// Reads and decodes a value, applying lazy expiry.
    ///
    /// A hit updates the entry's access metadata and its access stamp.
    pub fn get(&mut self, key: &str, now: u64) -> GetOutcome {
        let Some(entry) = self.entries.get_mut(key) else {
            return GetOutcome::Miss;
        };

        if entry.is_expired_at(now) {
            self.remove(key);
            return GetOutcome::Expired;
        }

        entry.touch(now);
        match self.codec.decode(&entry.value) {
            Ok(value) => {
                self.access.touch(key);
                GetOutcome::Hit(value)
            }
            Err(err) => {
                self.remove(key);
                GetOutcome::Corrupt(err)
            }
        }
    }

    // == Insert ==
    /// Stores an already-encoded value, replacing any previous entry.
    ///
    /// When the store is full and `key` is new, exactly one entry (the least
    /// recently used) is evicted first and its key returned.
    pub fn insert(
        &mut self,
        key: String,
        value: EncodedValue,
        ttl_ms: Option<u64>,
        tags: BTreeSet<String>,
        now: u64,
    ) -> Result<Option<String>> {
        let mut evicted = None;

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            let victim = self
                .access
                .oldest()
                .map(str::to_string)
                .ok_or_else(|| {
                    CacheError::CapacityExhausted(format!(
                        "no entry can be evicted (max_size = {})",
                        self.max_size
                    ))
                })?;
            self.remove(&victim);
            evicted = Some(victim);
        }

        self.remove(&key);

        let entry = CacheEntry::new(value, ttl_ms, tags, now);
        self.memory_bytes += key.len() + entry.value.len();
        self.tags.insert(&key, &entry.tags);
        self.access.touch(&key);
        self.entries.insert(key, entry);

        Ok(evicted)
    }

    // == Remove ==
    /// Removes an entry from every index.
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.access.remove(key);
        self.tags.remove(key, &entry.tags);
        self.memory_bytes = self
            .memory_bytes
            .saturating_sub(key.len() + entry.value.len());
        Some(entry)
    }

    /// Drops every entry. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.access.clear();
        self.tags.clear();
        self.memory_bytes = 0;
        removed
    }

    /// Structural existence check, no TTL evaluation.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// All keys, or those matching `pattern`, sorted.
    pub fn keys(&self, pattern: Option<&Pattern>) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .keys()
            .filter(|key| pattern.map_or(true, |p| p.matches(key)))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Keys carrying `tag`, sorted.
    pub fn tagged_keys(&self, tag: &str) -> Vec<String> {
        self.tags.keys_for(tag)
    }

    /// Removes expired entries among the next `limit` keys in access order
    /// with stamps in `(after, until]`.
    ///
    /// Returns the removed keys and the stamp to resume from, or `None` once
    /// the walk has passed `until`.
    pub fn sweep_slice(
        &mut self,
        now: u64,
        after: u64,
        until: u64,
        limit: usize,
    ) -> (Vec<String>, Option<u64>) {
        let slice = self.access.range(after, until, limit);
        let resume = (slice.len() == limit)
            .then(|| slice.last().map(|(stamp, _)| *stamp))
            .flatten();

        let mut removed = Vec::new();
        for (_, key) in slice {
            let expired = self
                .entries
                .get(&key)
                .is_some_and(|entry| entry.is_expired_at(now));
            if expired {
                self.remove(&key);
                removed.push(key);
            }
        }
        (removed, resume)
    }

    /// Last access stamp handed out; bounds a sweep to keys present when it
    /// started.
    pub fn last_access_stamp(&self) -> u64 {
        self.access.last_stamp()
    }

    // == Expire ==
    /// Rewrites the TTL of a live entry, counting from `now`.
    pub fn set_ttl(&mut self, key: &str, ttl_ms: u64, now: u64) -> ExpireOutcome {
        let Some(entry) = self.entries.get_mut(key) else {
            return ExpireOutcome::Missing;
        };

        if entry.is_expired_at(now) {
            self.remove(key);
            return ExpireOutcome::Expired;
        }

        entry.reset_ttl(ttl_ms, now);
        ExpireOutcome::Updated
    }

    /// TTL as seen at `now`; missing keys report `Expired`.
    pub fn ttl_status(&self, key: &str, now: u64) -> TtlStatus {
        self.entries
            .get(key)
            .map_or(TtlStatus::Expired, |entry| entry.ttl_status(now))
    }

    pub fn entry(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    // == Persistence Support ==
    /// Copy of the entry table for snapshotting.
    pub fn export(&self) -> HashMap<String, CacheEntry> {
        self.entries.clone()
    }

    /// Loads snapshot entries into an empty store.
    ///
    /// Stale entries are dropped; the rest are inserted by ascending
    /// `last_accessed` so the access order survives the round trip, up to
    /// `max_size`. Returns how many entries were restored.
    pub fn restore(&mut self, entries: HashMap<String, CacheEntry>, now: u64) -> usize {
        let mut live: Vec<(String, CacheEntry)> = entries
            .into_iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .collect();
        live.sort_by(|a, b| {
            a.1.last_accessed
                .cmp(&b.1.last_accessed)
                .then_with(|| a.0.cmp(&b.0))
        });

        // Keep the most recently used when the snapshot exceeds capacity
        let skip = live.len().saturating_sub(self.max_size);
        let mut restored = 0;
        for (key, entry) in live.into_iter().skip(skip) {
            if self.entries.contains_key(&key) {
                continue;
            }
            self.memory_bytes += key.len() + entry.value.len();
            self.tags.insert(&key, &entry.tags);
            self.access.touch(&key);
            self.entries.insert(key, entry);
            restored += 1;
        }
        restored
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.memory_bytes
    }

    /// Entry table, access order and tag membership agree.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        self.access.len() == self.entries.len()
            && self.entries.keys().all(|key| self.access.contains(key))
            && self.entries.iter().all(|(key, entry)| {
                entry
                    .tags
                    .iter()
                    .all(|tag| self.tags.keys_for(tag).contains(key))
            })
            && self.memory_bytes
                == self
                    .entries
                    .iter()
                    .map(|(key, entry)| key.len() + entry.value.len())
                    .sum::<usize>()
    }
}

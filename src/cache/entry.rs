//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::cache::EncodedValue;

// == Cache Entry ==
/// Represents a single cache entry with its encoded value and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The stored value after codec processing
    pub value: EncodedValue,
    /// Time to live in milliseconds, None = no expiration
    pub ttl_ms: Option<u64>,
    /// Creation timestamp (Unix milliseconds); reset by overwrite and `expire`
    pub created_at: u64,
    /// Last access timestamp (Unix milliseconds)
    pub last_accessed: u64,
    /// Number of successful reads
    pub access_count: u64,
    /// Tags derived from key patterns at set-time
    pub tags: BTreeSet<String>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry created at `now`.
    pub fn new(value: EncodedValue, ttl_ms: Option<u64>, tags: BTreeSet<String>, now: u64) -> Self {
        Self {
            value,
            ttl_ms,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            tags,
        }
    }

    /// Absolute expiration timestamp, if the entry has a TTL.
    pub fn expires_at(&self) -> Option<u64> {
        self.ttl_ms.map(|ttl| self.created_at.saturating_add(ttl))
    }

    // == Is Expired ==
    /// Checks if the entry is stale at `now`.
    ///
    /// An entry is stale once `now > created_at + ttl`; at exactly
    /// `created_at + ttl` it is still served.
    pub fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_at() {
            Some(expires) => now > expires,
            None => false,
        }
    }

    /// Remaining lifetime as seen at `now`.
    pub fn ttl_status(&self, now: u64) -> TtlStatus {
        match self.expires_at() {
            None => TtlStatus::NoTtl,
            Some(expires) if now > expires => TtlStatus::Expired,
            Some(expires) => TtlStatus::Fresh(expires - now),
        }
    }

    /// Records a read.
    pub fn touch(&mut self, now: u64) {
        self.last_accessed = now;
        self.access_count += 1;
    }

    /// Rewrites the TTL so that it counts from `now`.
    pub fn reset_ttl(&mut self, ttl_ms: u64, now: u64) {
        self.ttl_ms = Some(ttl_ms);
        self.created_at = now;
    }
}

// == TTL Status ==
/// Result of a TTL query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    /// Live entry with the given remaining milliseconds
    Fresh(u64),
    /// Live entry without expiration
    NoTtl,
    /// Entry is stale or absent
    Expired,
}

impl TtlStatus {
    /// Numeric form: remaining ms, `-1` for no TTL, `-2` for expired or missing.
    pub fn code(&self) -> i64 {
        match self {
            TtlStatus::Fresh(ms) => i64::try_from(*ms).unwrap_or(i64::MAX),
            TtlStatus::NoTtl => -1,
            TtlStatus::Expired => -2,
        }
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

//! Cache Statistics Module
//!
//! Tracks cache performance metrics: monotonic counters plus a bounded log of
//! recent operations used for the derived response-time metric.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::OPERATION_LOG_CAPACITY;

// == Operation Log ==
/// Kind of a recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Get,
    Set,
    Delete,
    Clear,
    Expire,
    GetByTag,
    DeleteByTag,
    Invalidate,
}

/// One entry of the operation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    /// Key, tag or pattern the operation targeted
    pub key: String,
    /// Wall time spent inside the engine, in milliseconds
    pub duration_ms: f64,
    /// Hit/miss for reads, None for writes
    pub hit: Option<bool>,
    pub timestamp: DateTime<Utc>,
}

// == Cache Stats ==
/// Point-in-time view of the cache metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found, expired or corrupt)
    pub misses: u64,
    /// Number of committed `set` calls
    pub sets: u64,
    /// Number of entries removed by explicit deletes
    pub deletes: u64,
    /// Number of entries evicted due to LRU policy
    pub evictions: u64,
    /// Number of entries removed because their TTL elapsed
    pub expirations: u64,
    /// Snapshot writes that failed
    pub persistence_errors: u64,
    /// Peer notifications that failed
    pub cluster_sync_errors: u64,
    /// Current number of entries in the cache
    pub total_keys: usize,
    /// Bytes held by keys and encoded values
    pub memory_usage: usize,
    /// hits / (hits + misses), 0 when no reads happened
    pub hit_rate: f64,
    /// Mean duration over the retained operation log, in milliseconds
    pub avg_response_time: f64,
}

// == Stats Recorder ==
/// Thread-safe recorder behind `CacheStats`.
///
/// Counters are always maintained; the operation log is only kept when stats
/// are enabled.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    persistence_errors: AtomicU64,
    cluster_sync_errors: AtomicU64,
    log: Mutex<VecDeque<Operation>>,
}

impl StatsRecorder {
    // == Constructor ==
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deletes(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_persistence_error(&self) {
        self.persistence_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cluster_sync_error(&self) {
        self.cluster_sync_errors.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Operation ==
    /// Appends an operation to the log, dropping the oldest past capacity.
    pub fn record_operation(
        &self,
        kind: OperationKind,
        key: &str,
        started: Instant,
        hit: Option<bool>,
    ) {
        if !self.enabled {
            return;
        }

        let operation = Operation {
            kind,
            key: key.to_string(),
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            hit,
            timestamp: Utc::now(),
        };

        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        if log.len() >= OPERATION_LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(operation);
    }

    /// The most recent `limit` operations, oldest first.
    pub fn operations(&self, limit: usize) -> Vec<Operation> {
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = log.len().saturating_sub(limit);
        log.iter().skip(skip).cloned().collect()
    }

    // == Snapshot ==
    /// Builds a `CacheStats` from the counters and the given store figures.
    pub fn snapshot(&self, total_keys: usize, memory_usage: usize) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let reads = hits + misses;

        let avg_response_time = {
            let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
            if log.is_empty() {
                0.0
            } else {
                log.iter().map(|op| op.duration_ms).sum::<f64>() / log.len() as f64
            }
        };

        CacheStats {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            persistence_errors: self.persistence_errors.load(Ordering::Relaxed),
            cluster_sync_errors: self.cluster_sync_errors.load(Ordering::Relaxed),
            total_keys,
            memory_usage,
            hit_rate: if reads == 0 {
                0.0
            } else {
                hits as f64 / reads as f64
            },
            avg_response_time,
        }
    }

    /// Restores counters from a persisted snapshot.
    pub fn restore(&self, stats: &CacheStats) {
        self.hits.store(stats.hits, Ordering::Relaxed);
        self.misses.store(stats.misses, Ordering::Relaxed);
        self.sets.store(stats.sets, Ordering::Relaxed);
        self.deletes.store(stats.deletes, Ordering::Relaxed);
        self.evictions.store(stats.evictions, Ordering::Relaxed);
        self.expirations.store(stats.expirations, Ordering::Relaxed);
        self.persistence_errors
            .store(stats.persistence_errors, Ordering::Relaxed);
        self.cluster_sync_errors
            .store(stats.cluster_sync_errors, Ordering::Relaxed);
    }
}

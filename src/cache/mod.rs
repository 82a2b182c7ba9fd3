//! Cache Module
//!
//! In-process caching with TTL expiration, LRU eviction, tag grouping,
//! transparent compression and lifecycle events.

mod access;
mod codec;
mod entry;
mod events;
mod handle;
mod stats;
mod store;
mod tags;


// Re-export public types
pub use access::AccessOrder;
pub use codec::{CacheValue, Codec, EncodedValue};
pub use entry::{current_timestamp_ms, CacheEntry, TtlStatus};
pub use events::{CacheEvent, CacheEventKind, EventBus, EventCallback, SubscriptionId};
pub use handle::{CacheHandle, MsetReport, WarmupReport, WeakCacheHandle};
pub use stats::{CacheStats, Operation, OperationKind, StatsRecorder};
pub use store::{CacheStore, ExpireOutcome, GetOutcome};
pub use tags::{compile_glob, TagConfig, TagMembership, TagPatterns, TagResolution};

// == Public Constants ==
/// Number of operations retained by the operation log
pub const OPERATION_LOG_CAPACITY: usize = 1000;

/// Keys scanned per exclusive-lock acquisition during an active sweep
pub const SWEEP_CHUNK_SIZE: usize = 256;

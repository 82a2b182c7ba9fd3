//! Tagged Cache - An in-process cache engine
//!
//! Key/value caching with TTL expiration, LRU eviction, tag-based grouping,
//! transparent compression, lifecycle events, optional snapshot persistence
//! and best-effort peer notification. The `api` module exposes the engine
//! over HTTP.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheEventKind, CacheHandle, CacheValue, TagConfig, TtlStatus};
pub use config::{CacheConfig, Config};
pub use error::{CacheError, Result};

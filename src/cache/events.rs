//! Event Bus Module
//!
//! Typed lifecycle events and a per-kind subscription registry. Each callback
//! invocation is isolated: a panicking subscriber is logged and skipped.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

/// Lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEventKind {
    Hit,
    Miss,
    Set,
    Delete,
    Expire,
    Evict,
    Clear,
}

/// A delivered event. `key` is None for `Clear`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEvent {
    pub kind: CacheEventKind,
    pub key: Option<String>,
    pub at: DateTime<Utc>,
}

impl CacheEvent {
    pub fn new(kind: CacheEventKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: Some(key.into()),
            at: Utc::now(),
        }
    }

    pub fn clear() -> Self {
        Self {
            kind: CacheEventKind::Clear,
            key: None,
            at: Utc::now(),
        }
    }
}

/// Callback type held by the registry.
pub type EventCallback = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

/// Handle returned by `on`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

// == Event Bus ==
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<CacheEventKind, Vec<(SubscriptionId, EventCallback)>>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<_, _> = subscribers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventBus")
            .field("subscribers", &counts)
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for one event kind.
    pub fn on<F>(&self, kind: CacheEventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Removes a callback. Returns true if it was registered for `kind`.
    pub fn off(&self, kind: CacheEventKind, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match subscribers.get_mut(&kind) {
            Some(callbacks) => {
                let before = callbacks.len();
                callbacks.retain(|(sub, _)| *sub != id);
                callbacks.len() != before
            }
            None => false,
        }
    }

    /// Delivers one event to every subscriber of its kind.
    pub fn emit(&self, event: &CacheEvent) {
        // Snapshot the callbacks so subscribers may call on/off re-entrantly
        let callbacks: Vec<EventCallback> = {
            let subscribers = self
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match subscribers.get(&event.kind) {
                Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                None => return,
            }
        };

        for callback in callbacks {
            if let Err(panic_info) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
                let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                error!(
                    event = ?event.kind,
                    key = ?event.key,
                    panic = %panic_msg,
                    "event subscriber panicked"
                );
            }
        }
    }

    pub fn emit_all(&self, events: &[CacheEvent]) {
        for event in events {
            self.emit(event);
        }
    }

    /// Number of callbacks registered for `kind`.
    pub fn subscriber_count(&self, kind: CacheEventKind) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

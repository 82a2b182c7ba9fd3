//! Cache Handle Module
//!
//! The public entry point of the engine. A `CacheHandle` is created once at
//! startup with a `CacheConfig` and cloned to every caller; clones share the
//! same store.
//!
//! Locking: the store (entries, access order and tag membership) sits behind
//! one async `RwLock`. Every mutation, including the LRU bookkeeping done by
//! reads, takes it exclusively. Events are delivered and hooks are triggered
//! only after the lock is released.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock as StdRwLock, Weak};
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{
    compile_glob, current_timestamp_ms, CacheEvent, CacheEventKind, CacheStats, CacheStore,
    CacheValue, Codec, EventBus, ExpireOutcome, GetOutcome, Operation, OperationKind,
    StatsRecorder, SubscriptionId, TagConfig, TagPatterns, TagResolution, TtlStatus,
    SWEEP_CHUNK_SIZE,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::persistence::{self, Snapshot};
use crate::tasks::{spawn_sweep_task, ClusterNode, ClusterOp, ClusterWorker, PersistenceWorker};

/// Outcome of `mset`: successes are kept even when other keys fail.
#[derive(Debug, Default)]
pub struct MsetReport {
    pub stored: Vec<String>,
    pub failed: Vec<(String, CacheError)>,
}

impl MsetReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of `warmup`, per key.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WarmupReport {
    pub loaded: Vec<String>,
    /// Key and the loader or encode error message
    pub failed: Vec<(String, String)>,
}

#[derive(Debug)]
struct Shared {
    config: CacheConfig,
    codec: Codec,
    store: RwLock<CacheStore>,
    patterns: StdRwLock<TagPatterns>,
    stats: Arc<StatsRecorder>,
    events: EventBus,
    persistence: Option<PersistenceWorker>,
    cluster: Option<ClusterWorker>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

// == Cache Handle ==
/// Shared handle to one cache instance.
#[derive(Debug, Clone)]
pub struct CacheHandle {
    inner: Arc<Shared>,
}

/// Non-owning handle held by background tasks.
#[derive(Debug, Clone)]
pub struct WeakCacheHandle {
    inner: Weak<Shared>,
}

impl WeakCacheHandle {
    pub fn upgrade(&self) -> Option<CacheHandle> {
        self.inner.upgrade().map(|inner| CacheHandle { inner })
    }
}

impl CacheHandle {
    // == Constructor ==
    /// Creates the cache and starts its background tasks.
    ///
    /// With persistence enabled, the last snapshot at `persist_path` is
    /// loaded first. A missing snapshot starts an empty cache; an unreadable
    /// one is logged, counted as a persistence error, and ignored.
    pub async fn new(config: CacheConfig) -> Self {
        let codec = Codec::new(config.compression_threshold);
        let mut store = CacheStore::new(config.max_size, codec);
        let stats = Arc::new(StatsRecorder::new(config.enable_stats));

        let mut patterns = TagPatterns::new();
        for (pattern, tag_config) in &config.tag_patterns {
            if let Err(err) = patterns.add(pattern, tag_config.clone()) {
                warn!(pattern = %pattern, error = %err, "Skipping configured tag pattern");
            }
        }

        if config.persist_to_disk {
            match persistence::load_snapshot(&config.persist_path).await {
                Ok(Some(snapshot)) => {
                    let restored = store.restore(snapshot.entries, current_timestamp_ms());
                    stats.restore(&snapshot.stats);
                    info!(
                        restored,
                        saved_at = %snapshot.saved_at,
                        "Restored cache snapshot"
                    );
                }
                Ok(None) => debug!("No cache snapshot found, starting empty"),
                Err(err) => {
                    stats.record_persistence_error();
                    warn!(error = %err, "Ignoring unreadable cache snapshot");
                }
            }
        }

        let inner = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let handle = WeakCacheHandle {
                inner: weak.clone(),
            };
            let persistence = config
                .persist_to_disk
                .then(|| PersistenceWorker::spawn(handle.clone(), config.persist_path.clone()));
            let cluster = config
                .enable_clustering
                .then(|| ClusterWorker::spawn(&config, Arc::clone(&stats)));
            let sweeper = (!config.cleanup_interval.is_zero())
                .then(|| spawn_sweep_task(handle, config.cleanup_interval));

            Shared {
                codec,
                store: RwLock::new(store),
                patterns: StdRwLock::new(patterns),
                stats,
                events: EventBus::new(),
                persistence,
                cluster,
                sweeper: Mutex::new(sweeper),
                shut_down: AtomicBool::new(false),
                config,
            }
        });

        info!(
            max_size = inner.config.max_size,
            compression_threshold = inner.config.compression_threshold,
            persistence = inner.config.persist_to_disk,
            clustering = inner.config.enable_clustering,
            "Cache initialized"
        );
        Self { inner }
    }

    pub fn downgrade(&self) -> WeakCacheHandle {
        WeakCacheHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    // == Get ==
    /// Returns the value if present and not expired.
    ///
    /// A stale entry is removed on access and reported as a miss. An entry
    /// that fails to decode is removed too.
    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        let started = Instant::now();
        let outcome = {
            let mut store = self.inner.store.write().await;
            store.get(key, current_timestamp_ms())
        };

        let value = self.settle_reads(vec![(key.to_string(), outcome)]).remove(key);
        self.inner
            .stats
            .record_operation(OperationKind::Get, key, started, Some(value.is_some()));
        value
    }

    // == Set ==
    /// Stores a value, replacing any previous entry and restarting its TTL.
    ///
    /// TTL resolution: `ttl`, then the first matching tag pattern's TTL,
    /// then `default_ttl`. When the cache is full and `key` is new, the least
    /// recently used entry is evicted first.
    pub async fn set(
        &self,
        key: impl Into<String>,
        value: impl Into<CacheValue>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let started = Instant::now();
        let key = key.into();
        let result = self.store_value(&key, value.into(), ttl).await;
        if let Err(err) = &result {
            debug!(key = %key, error = %err, "Set rejected");
        }
        self.inner
            .stats
            .record_operation(OperationKind::Set, &key, started, None);
        result
    }

    /// Serializes any `Serialize` value and stores it as a structured value.
    pub async fn set_json<T: serde::Serialize>(
        &self,
        key: impl Into<String>,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let value = CacheValue::structured(value)?;
        self.set(key, value, ttl).await
    }

    async fn store_value(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<()> {
        let TagResolution {
            tags,
            ttl: pattern_ttl,
            compress,
        } = self.resolve_tags(key);
        let ttl_ms = ttl
            .or(pattern_ttl)
            .or(self.inner.config.default_ttl)
            .map(duration_ms);
        let encoded = self.inner.codec.encode(&value, compress)?;

        let evicted = {
            let mut store = self.inner.store.write().await;
            store.insert(key.to_string(), encoded, ttl_ms, tags, current_timestamp_ms())?
        };

        self.inner.stats.record_set();
        let mut events = Vec::with_capacity(2);
        if let Some(victim) = evicted {
            self.inner.stats.record_eviction();
            debug!(evicted = %victim, "Evicted least recently used entry");
            events.push(CacheEvent::new(CacheEventKind::Evict, victim));
        }
        events.push(CacheEvent::new(CacheEventKind::Set, key));
        self.inner.events.emit_all(&events);

        self.after_write(ClusterOp::Set {
            key: key.to_string(),
            ttl_ms,
        });
        Ok(())
    }

    // == Delete ==
    /// Removes an entry. Returns true if it existed.
    pub async fn delete(&self, key: &str) -> bool {
        let started = Instant::now();
        let removed = self.inner.store.write().await.remove(key).is_some();
        if removed {
            self.settle_deletes(&[key.to_string()]);
        }
        self.inner
            .stats
            .record_operation(OperationKind::Delete, key, started, None);
        removed
    }

    // == Clear ==
    /// Drops every entry. Clearing an empty cache is a no-op.
    pub async fn clear(&self) {
        let started = Instant::now();
        let removed = self.inner.store.write().await.clear();
        if removed > 0 {
            info!(removed, "Cache cleared");
            self.inner.events.emit(&CacheEvent::clear());
            self.after_write(ClusterOp::Clear);
        }
        self.inner
            .stats
            .record_operation(OperationKind::Clear, "*", started, None);
    }

    /// Structural existence check: no TTL evaluation, no side effects.
    pub async fn exists(&self, key: &str) -> bool {
        self.inner.store.read().await.contains(key)
    }

    /// Keys matching a glob (all keys when `pattern` is None), sorted.
    pub async fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let matcher = pattern.map(compile_glob).transpose()?;
        Ok(self.inner.store.read().await.keys(matcher.as_ref()))
    }

    // == Batch Operations ==
    /// Returns the subset of `keys` that hit.
    pub async fn mget<K: AsRef<str>>(&self, keys: &[K]) -> HashMap<String, CacheValue> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref();
            if let Some(value) = self.get(key).await {
                found.insert(key.to_string(), value);
            }
        }
        found
    }

    /// Applies `set` per entry. Failures are reported per key; earlier
    /// successes are not rolled back.
    pub async fn mset<I, K, V>(&self, entries: I, ttl: Option<Duration>) -> MsetReport
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<CacheValue>,
    {
        let mut report = MsetReport::default();
        for (key, value) in entries {
            let key = key.into();
            match self.set(key.clone(), value, ttl).await {
                Ok(()) => report.stored.push(key),
                Err(err) => report.failed.push((key, err)),
            }
        }
        report
    }

    // == TTL Operations ==
    /// Gives a live entry a new TTL counted from now. Returns false if the
    /// key is absent or already stale.
    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        let started = Instant::now();
        let outcome = {
            let mut store = self.inner.store.write().await;
            store.set_ttl(key, duration_ms(ttl), current_timestamp_ms())
        };

        let updated = match outcome {
            ExpireOutcome::Updated => {
                self.schedule_snapshot();
                true
            }
            ExpireOutcome::Expired => {
                self.inner.stats.record_expirations(1);
                self.inner
                    .events
                    .emit(&CacheEvent::new(CacheEventKind::Expire, key));
                false
            }
            ExpireOutcome::Missing => false,
        };
        self.inner
            .stats
            .record_operation(OperationKind::Expire, key, started, None);
        updated
    }

    /// Remaining lifetime of a key. Read-only.
    pub async fn ttl(&self, key: &str) -> TtlStatus {
        self.inner
            .store
            .read()
            .await
            .ttl_status(key, current_timestamp_ms())
    }

    // == Tag Operations ==
    /// Live entries carrying `tag`. Stale members are removed on the way.
    pub async fn get_by_tag(&self, tag: &str) -> HashMap<String, CacheValue> {
        let started = Instant::now();
        let outcomes = {
            let mut store = self.inner.store.write().await;
            let now = current_timestamp_ms();
            store
                .tagged_keys(tag)
                .into_iter()
                .map(|key| {
                    let outcome = store.get(&key, now);
                    (key, outcome)
                })
                .collect::<Vec<_>>()
        };

        let values = self.settle_reads(outcomes);
        self.inner
            .stats
            .record_operation(OperationKind::GetByTag, tag, started, None);
        values
    }

    /// Deletes every entry carrying `tag`. Returns how many were removed.
    pub async fn delete_by_tag(&self, tag: &str) -> usize {
        let started = Instant::now();
        let removed: Vec<String> = {
            let mut store = self.inner.store.write().await;
            store
                .tagged_keys(tag)
                .into_iter()
                .filter(|key| store.remove(key).is_some())
                .collect()
        };

        self.settle_deletes(&removed);
        self.inner
            .stats
            .record_operation(OperationKind::DeleteByTag, tag, started, None);
        removed.len()
    }

    /// Deletes every key matching a glob. Returns how many were removed.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        let started = Instant::now();
        let matcher = compile_glob(pattern)?;
        let removed: Vec<String> = {
            let mut store = self.inner.store.write().await;
            store
                .keys(Some(&matcher))
                .into_iter()
                .filter(|key| store.remove(key).is_some())
                .collect()
        };

        if !removed.is_empty() {
            info!(pattern = %pattern, removed = removed.len(), "Invalidated keys");
        }
        self.settle_deletes(&removed);
        self.inner
            .stats
            .record_operation(OperationKind::Invalidate, pattern, started, None);
        Ok(removed.len())
    }

    /// Registers a tag pattern. Already stored entries keep their tags.
    pub fn add_pattern(&self, pattern: &str, config: TagConfig) -> Result<()> {
        self.inner
            .patterns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(pattern, config)
    }

    /// Unregisters a tag pattern. Returns true if it was registered.
    pub fn remove_pattern(&self, pattern: &str) -> bool {
        self.inner
            .patterns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(pattern)
    }

    pub fn patterns(&self) -> Vec<(String, TagConfig)> {
        self.inner
            .patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .list()
    }

    fn resolve_tags(&self, key: &str) -> TagResolution {
        self.inner
            .patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resolve(key)
    }

    // == Events ==
    /// Subscribes to one event kind.
    pub fn on<F>(&self, kind: CacheEventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, callback)
    }

    pub fn off(&self, kind: CacheEventKind, id: SubscriptionId) -> bool {
        self.inner.events.off(kind, id)
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub async fn get_stats(&self) -> CacheStats {
        let store = self.inner.store.read().await;
        self.inner
            .stats
            .snapshot(store.len(), store.memory_usage())
    }

    /// The most recent `limit` operations, oldest first.
    pub fn get_operations(&self, limit: usize) -> Vec<Operation> {
        self.inner.stats.operations(limit)
    }

    // == Warmup ==
    /// Loads `keys` concurrently through `loader` and stores each result.
    /// Best-effort: failures are collected per key.
    pub async fn warmup<I, K, F, Fut>(&self, keys: I, loader: F) -> WarmupReport
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
        F: Fn(String) -> Fut,
        Fut: Future<Output = anyhow::Result<CacheValue>>,
    {
        let loads = keys.into_iter().map(|key| {
            let key: String = key.into();
            let load = loader(key.clone());
            async move { (key, load.await) }
        });
        let results = join_all(loads).await;

        let mut report = WarmupReport::default();
        for (key, result) in results {
            let stored = match result {
                Ok(value) => self.set(key.clone(), value, None).await.map_err(|e| e.to_string()),
                Err(err) => Err(format!("{:#}", err)),
            };
            match stored {
                Ok(()) => report.loaded.push(key),
                Err(message) => {
                    debug!(key = %key, error = %message, "Warmup failed for key");
                    report.failed.push((key, message));
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "Cache warmup finished"
        );
        report
    }

    // == Sweep ==
    /// Removes every expired entry. Returns how many were removed.
    ///
    /// The walk follows access order in slices of `SWEEP_CHUNK_SIZE` keys,
    /// each scanned and cleaned under one short exclusive lock, so foreground
    /// operations interleave with a long sweep. Keys touched after the sweep
    /// starts are left for the next one.
    pub async fn purge_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let until = self.inner.store.read().await.last_access_stamp();

        let mut removed = Vec::new();
        let mut cursor = 0;
        loop {
            let (slice, resume) = self
                .inner
                .store
                .write()
                .await
                .sweep_slice(now, cursor, until, SWEEP_CHUNK_SIZE);
            removed.extend(slice);

            match resume {
                Some(stamp) => cursor = stamp,
                None => break,
            }
            tokio::task::yield_now().await;
        }

        if !removed.is_empty() {
            self.inner.stats.record_expirations(removed.len() as u64);
            let events: Vec<CacheEvent> = removed
                .iter()
                .map(|key| CacheEvent::new(CacheEventKind::Expire, key.as_str()))
                .collect();
            self.inner.events.emit_all(&events);
        }
        removed.len()
    }

    // == Cluster ==
    /// Peer table; empty when clustering is disabled.
    pub fn cluster_nodes(&self) -> Vec<ClusterNode> {
        self.inner
            .cluster
            .as_ref()
            .map(ClusterWorker::nodes)
            .unwrap_or_default()
    }

    // == Shutdown ==
    /// Stops the sweep task, flushes a final snapshot and drains pending
    /// peer notifications. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let sweeper = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        if let Some(persistence) = &self.inner.persistence {
            persistence.shutdown().await;
        }
        if let Some(cluster) = &self.inner.cluster {
            cluster.shutdown().await;
        }
        info!("Cache shut down");
    }

    /// Writes the current contents to `path`; failures are logged and counted.
    pub(crate) async fn save_snapshot(&self, path: &Path) {
        let snapshot = {
            let store = self.inner.store.read().await;
            Snapshot::new(
                store.export(),
                self.inner.stats.snapshot(store.len(), store.memory_usage()),
            )
        };

        match persistence::write_snapshot(path, &snapshot).await {
            Ok(()) => debug!(
                entries = snapshot.entries.len(),
                path = %path.display(),
                "Snapshot written"
            ),
            Err(err) => {
                self.inner.stats.record_persistence_error();
                warn!(error = %err, "Snapshot write failed");
            }
        }
    }

    // == Internal Helpers ==
    /// Turns read outcomes into stats and events; returns the hits.
    fn settle_reads(&self, outcomes: Vec<(String, GetOutcome)>) -> HashMap<String, CacheValue> {
        let stats = &self.inner.stats;
        let mut events = Vec::with_capacity(outcomes.len());
        let mut hits = HashMap::new();

        for (key, outcome) in outcomes {
            match outcome {
                GetOutcome::Hit(value) => {
                    stats.record_hit();
                    events.push(CacheEvent::new(CacheEventKind::Hit, key.as_str()));
                    hits.insert(key, value);
                }
                GetOutcome::Miss => {
                    stats.record_miss();
                    events.push(CacheEvent::new(CacheEventKind::Miss, key));
                }
                GetOutcome::Expired => {
                    stats.record_miss();
                    stats.record_expirations(1);
                    events.push(CacheEvent::new(CacheEventKind::Miss, key.as_str()));
                    events.push(CacheEvent::new(CacheEventKind::Expire, key));
                }
                GetOutcome::Corrupt(err) => {
                    stats.record_miss();
                    warn!(key = %key, error = %err, "Dropped undecodable entry");
                    events.push(CacheEvent::new(CacheEventKind::Miss, key));
                }
            }
        }

        self.inner.events.emit_all(&events);
        hits
    }

    /// Stats, events and hooks for keys removed by explicit deletes.
    fn settle_deletes(&self, removed: &[String]) {
        if removed.is_empty() {
            return;
        }

        self.inner.stats.record_deletes(removed.len() as u64);
        let events: Vec<CacheEvent> = removed
            .iter()
            .map(|key| CacheEvent::new(CacheEventKind::Delete, key.as_str()))
            .collect();
        self.inner.events.emit_all(&events);

        self.schedule_snapshot();
        if let Some(cluster) = &self.inner.cluster {
            for key in removed {
                cluster.notify(ClusterOp::Delete { key: key.clone() });
            }
        }
    }

    fn after_write(&self, op: ClusterOp) {
        self.schedule_snapshot();
        if let Some(cluster) = &self.inner.cluster {
            cluster.notify(op);
        }
    }

    fn schedule_snapshot(&self) {
        if let Some(persistence) = &self.inner.persistence {
            persistence.schedule();
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

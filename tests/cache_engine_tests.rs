//! Integration Tests for the Cache Engine
//!
//! Exercises `CacheHandle` through its public API: expiry, eviction, codec,
//! tags, statistics, events, sweeping and peer notification.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::State, routing::post, Json, Router};
use serde_json::json;
use tagged_cache::cache::CacheEvent;
use tagged_cache::tasks::{ClusterMessage, ClusterOp, NodeStatus};
use tagged_cache::{CacheConfig, CacheEventKind, CacheHandle, CacheValue, TagConfig, TtlStatus};
use tokio::time::sleep;

// == Helper Functions ==

fn config(max_size: usize) -> CacheConfig {
    CacheConfig {
        max_size,
        default_ttl: None,
        cleanup_interval: Duration::ZERO,
        ..CacheConfig::default()
    }
}

async fn cache(max_size: usize) -> CacheHandle {
    CacheHandle::new(config(max_size)).await
}

// == TTL Correctness ==

#[tokio::test]
async fn test_value_served_until_ttl_then_missed() {
    let cache = cache(10).await;
    cache
        .set("k", "v", Some(Duration::from_millis(80)))
        .await
        .unwrap();

    assert_eq!(cache.get("k").await, Some(CacheValue::from("v")));

    sleep(Duration::from_millis(150)).await;
    // Not yet accessed, so still structurally present
    assert!(cache.exists("k").await);
    assert_eq!(cache.get("k").await, None);
    // The lazy access removed it
    assert!(!cache.exists("k").await);

    let stats = cache.get_stats().await;
    assert_eq!(stats.expirations, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_purge_removes_only_expired_entries() {
    let cache = cache(10).await;
    let expired = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&expired);
    cache.on(CacheEventKind::Expire, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    for i in 0..3 {
        cache
            .set(format!("short:{}", i), json!(i), Some(Duration::from_millis(20)))
            .await
            .unwrap();
    }
    cache.set("long", json!(1), Some(Duration::from_secs(60))).await.unwrap();
    cache.set("forever", json!(1), None).await.unwrap();

    sleep(Duration::from_millis(60)).await;
    assert_eq!(cache.purge_expired().await, 3);
    assert_eq!(cache.purge_expired().await, 0);

    assert_eq!(cache.keys(None).await.unwrap(), vec!["forever", "long"]);
    assert_eq!(expired.load(Ordering::SeqCst), 3);
    assert_eq!(cache.get_stats().await.expirations, 3);
}

#[tokio::test]
async fn test_background_sweep_runs_on_interval() {
    let cache = CacheHandle::new(CacheConfig {
        cleanup_interval: Duration::from_millis(25),
        ..config(10)
    })
    .await;
    cache
        .set("k", "v", Some(Duration::from_millis(10)))
        .await
        .unwrap();

    sleep(Duration::from_millis(150)).await;
    assert!(!cache.exists("k").await);
    cache.shutdown().await;
}

#[tokio::test]
async fn test_default_ttl_applies_when_none_given() {
    let cache = CacheHandle::new(CacheConfig {
        default_ttl: Some(Duration::from_secs(30)),
        ..config(10)
    })
    .await;
    cache.set("k", "v", None).await.unwrap();

    assert!(matches!(cache.ttl("k").await, TtlStatus::Fresh(ms) if ms <= 30_000));
}

// == LRU Eviction ==

#[tokio::test]
async fn test_lru_evicts_least_recently_accessed() {
    let cache = cache(3).await;
    let evicted = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&evicted);
    cache.on(CacheEventKind::Evict, move |event: &CacheEvent| {
        sink.lock().unwrap().push(event.key.clone().unwrap_or_default());
    });

    cache.set("a", json!(1), None).await.unwrap();
    cache.set("b", json!(2), None).await.unwrap();
    cache.set("c", json!(3), None).await.unwrap();
    // "a" becomes most recent, leaving "b" the oldest
    cache.get("a").await;
    cache.set("d", json!(4), None).await.unwrap();

    assert_eq!(*evicted.lock().unwrap(), vec!["b".to_string()]);
    assert!(!cache.exists("b").await);
    assert_eq!(cache.get_stats().await.evictions, 1);
    assert_eq!(cache.get_stats().await.total_keys, 3);
}

#[tokio::test]
async fn test_overwrite_never_evicts() {
    let cache = cache(2).await;
    cache.set("a", json!(1), None).await.unwrap();
    cache.set("b", json!(2), None).await.unwrap();
    cache.set("a", json!(10), None).await.unwrap();

    assert_eq!(cache.get_stats().await.evictions, 0);
    assert_eq!(cache.get("a").await, Some(CacheValue::from(json!(10))));
    assert!(cache.exists("b").await);
}

// == Scenarios ==

#[tokio::test]
async fn test_scenario_single_slot_eviction() {
    let cache = cache(1).await;

    cache
        .set("a", json!(1), Some(Duration::from_millis(100)))
        .await
        .unwrap();
    cache.set("b", json!(2), None).await.unwrap();

    assert_eq!(cache.get("a").await, None);
    assert_eq!(cache.get("b").await, Some(CacheValue::from(json!(2))));
}

#[tokio::test]
async fn test_scenario_expire_then_ttl_reports_expired() {
    let cache = cache(1).await;
    cache.set("b", json!(2), None).await.unwrap();

    assert!(cache.expire("b", Duration::from_millis(50)).await);
    sleep(Duration::from_millis(60)).await;

    assert_eq!(cache.ttl("b").await, TtlStatus::Expired);
    assert_eq!(cache.ttl("b").await.code(), -2);
    assert_eq!(cache.get("b").await, None);
}

// == Codec ==

#[tokio::test]
async fn test_large_structured_value_round_trips() {
    let cache = CacheHandle::new(CacheConfig {
        compression_threshold: 64,
        ..config(10)
    })
    .await;

    let rows: Vec<_> = (0..200)
        .map(|i| json!({"id": i, "name": format!("row-{}", i), "active": i % 2 == 0}))
        .collect();
    let document = json!({"rows": rows, "meta": {"count": 200}});
    let serialized_len = serde_json::to_vec(&document).unwrap().len();
    cache.set("doc", document.clone(), None).await.unwrap();

    assert_eq!(cache.get("doc").await, Some(CacheValue::from(document)));
    // Stored compressed, so the footprint is below the serialized size
    assert!(cache.get_stats().await.memory_usage < serialized_len);
}

#[tokio::test]
async fn test_typed_values_via_serde() {
    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Profile {
        name: String,
        roles: Vec<String>,
        visits: BTreeMap<String, u32>,
    }

    let cache = cache(10).await;
    let profile = Profile {
        name: "ada".into(),
        roles: vec!["admin".into()],
        visits: BTreeMap::from([("home".to_string(), 3)]),
    };
    cache.set_json("profile:ada", &profile, None).await.unwrap();

    let loaded: Profile = cache
        .get("profile:ada")
        .await
        .unwrap()
        .deserialize()
        .unwrap();
    assert_eq!(loaded, profile);
}

// == Tag Scoping ==

#[tokio::test]
async fn test_tag_scoping() {
    let cache = cache(10).await;
    cache
        .add_pattern("user:*", TagConfig::new(["user"]))
        .unwrap();

    cache.set("user:1", "alice", None).await.unwrap();
    cache.set("post:1", "hello", None).await.unwrap();

    let tagged = cache.get_by_tag("user").await;
    assert_eq!(tagged.len(), 1);
    assert!(tagged.contains_key("user:1"));

    assert_eq!(cache.delete_by_tag("user").await, 1);
    assert_eq!(cache.get("user:1").await, None);
    assert!(cache.exists("post:1").await);
}

#[tokio::test]
async fn test_overlapping_patterns_union_tags() {
    let cache = cache(10).await;
    cache
        .add_pattern("user:*", TagConfig::new(["user"]))
        .unwrap();
    cache
        .add_pattern("*:admin", TagConfig::new(["admin"]))
        .unwrap();

    cache.set("user:admin", "root", None).await.unwrap();

    assert!(cache.get_by_tag("user").await.contains_key("user:admin"));
    assert!(cache.get_by_tag("admin").await.contains_key("user:admin"));
    assert_eq!(cache.patterns().len(), 2);
}

#[tokio::test]
async fn test_get_by_tag_skips_expired_members() {
    let cache = cache(10).await;
    cache
        .add_pattern("tmp:*", TagConfig::new(["tmp"]))
        .unwrap();
    cache
        .set("tmp:1", "a", Some(Duration::from_millis(20)))
        .await
        .unwrap();
    cache.set("tmp:2", "b", None).await.unwrap();

    sleep(Duration::from_millis(60)).await;
    let tagged = cache.get_by_tag("tmp").await;

    assert_eq!(tagged.len(), 1);
    assert!(tagged.contains_key("tmp:2"));
    assert!(!cache.exists("tmp:1").await);
}

#[tokio::test]
async fn test_invalidate_pattern() {
    let cache = cache(10).await;
    for key in ["session:1", "session:2", "config"] {
        cache.set(key, "x", None).await.unwrap();
    }

    assert_eq!(cache.invalidate_pattern("session:*").await.unwrap(), 2);
    assert_eq!(cache.keys(None).await.unwrap(), vec!["config"]);
    assert_eq!(cache.get_stats().await.deletes, 2);
}

// == Stats ==

#[tokio::test]
async fn test_hit_rate_matches_observed_reads() {
    let cache = cache(10).await;
    cache.set("k", "v", None).await.unwrap();

    for _ in 0..3 {
        cache.get("k").await;
    }
    cache.get("missing").await;

    let stats = cache.get_stats().await;
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate - 0.75).abs() < 1e-9);
}

#[tokio::test]
async fn test_operation_log_disabled_keeps_counters() {
    let cache = CacheHandle::new(CacheConfig {
        enable_stats: false,
        ..config(10)
    })
    .await;
    cache.set("k", "v", None).await.unwrap();
    cache.get("k").await;

    assert!(cache.get_operations(10).is_empty());
    assert_eq!(cache.get_stats().await.hits, 1);
}

// == Idempotent Clear ==

#[tokio::test]
async fn test_clear_is_idempotent() {
    let cache = cache(10).await;
    let clears = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&clears);
    cache.on(CacheEventKind::Clear, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    cache.set("a", json!(1), None).await.unwrap();
    cache.clear().await;
    assert_eq!(cache.get_stats().await.total_keys, 0);

    cache.clear().await;
    assert_eq!(cache.get_stats().await.total_keys, 0);
    assert_eq!(clears.load(Ordering::SeqCst), 1);
}

// == Events ==

#[tokio::test]
async fn test_panicking_subscriber_is_isolated() {
    let cache = cache(10).await;
    let delivered = Arc::new(AtomicUsize::new(0));

    cache.on(CacheEventKind::Set, |_| panic!("subscriber bug"));
    let seen = Arc::clone(&delivered);
    cache.on(CacheEventKind::Set, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    cache.set("k", "v", None).await.unwrap();

    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert!(cache.exists("k").await);
}

#[tokio::test]
async fn test_hit_and_miss_events() {
    let cache = cache(10).await;
    let hits = Arc::new(AtomicUsize::new(0));
    let misses = Arc::new(AtomicUsize::new(0));
    let (h, m) = (Arc::clone(&hits), Arc::clone(&misses));
    cache.on(CacheEventKind::Hit, move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });
    cache.on(CacheEventKind::Miss, move |_| {
        m.fetch_add(1, Ordering::SeqCst);
    });

    cache.set("k", "v", None).await.unwrap();
    cache.mget(&["k", "x", "y"]).await;

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(misses.load(Ordering::SeqCst), 2);
}

// == Warmup ==

#[tokio::test]
async fn test_warmup_loads_concurrently() {
    let cache = cache(10).await;
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    let report = cache
        .warmup((0..5).map(|i| format!("item:{}", i)), move |key| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(10)).await;
                Ok(CacheValue::from(key))
            }
        })
        .await;

    assert_eq!(report.loaded.len(), 5);
    assert!(report.failed.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(
        cache.get("item:3").await,
        Some(CacheValue::from("item:3"))
    );
}

// == Cluster Notification ==

type Received = Arc<Mutex<Vec<ClusterMessage>>>;

async fn record_message(
    State(received): State<Received>,
    Json(message): Json<ClusterMessage>,
) -> Json<serde_json::Value> {
    received.lock().unwrap().push(message);
    Json(json!({"message": "ok"}))
}

/// Starts a peer that records every notification it receives.
async fn spawn_peer() -> (String, Received) {
    let received: Received = Arc::default();
    let app = Router::new()
        .route("/cluster/sync", post(record_message))
        .with_state(Arc::clone(&received));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr.to_string(), received)
}

#[tokio::test]
async fn test_mutations_are_sent_to_peers() {
    let (peer, received) = spawn_peer().await;
    let cache = CacheHandle::new(CacheConfig {
        enable_clustering: true,
        cluster_peers: vec![peer.clone()],
        node_id: "node-test".into(),
        ..config(10)
    })
    .await;

    cache
        .set("k", "v", Some(Duration::from_secs(5)))
        .await
        .unwrap();
    cache.delete("k").await;
    cache.shutdown().await;

    let messages = received.lock().unwrap().clone();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.origin == "node-test"));
    assert_eq!(
        messages[0].op,
        ClusterOp::Set {
            key: "k".into(),
            ttl_ms: Some(5000)
        }
    );
    assert_eq!(messages[1].op, ClusterOp::Delete { key: "k".into() });

    let nodes = cache.cluster_nodes();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].node_id, peer);
    assert_eq!(nodes[0].status, NodeStatus::Active);
    assert!(nodes[0].last_sync.is_some());
    assert_eq!(cache.get_stats().await.cluster_sync_errors, 0);
}

#[tokio::test]
async fn test_failed_peer_does_not_fail_operation() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let cache = CacheHandle::new(CacheConfig {
        enable_clustering: true,
        cluster_peers: vec![format!("127.0.0.1:{}", port)],
        cluster_sync_timeout: Duration::from_millis(300),
        ..config(10)
    })
    .await;

    cache.set("k", "v", None).await.unwrap();
    cache.shutdown().await;

    assert!(cache.exists("k").await);
    assert_eq!(cache.cluster_nodes()[0].status, NodeStatus::Inactive);
    assert_eq!(cache.get_stats().await.cluster_sync_errors, 1);
}

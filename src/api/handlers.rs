//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint. Handlers only
//! translate between JSON and `CacheHandle` calls; the engine does the rest.

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::info;

use crate::cache::{CacheHandle, CacheStats, CacheValue, Operation};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::models::{
    validate_key, AckResponse, DeleteResponse, ExistsResponse, ExpireRequest, ExpireResponse,
    GetResponse, HealthResponse, InvalidateRequest, KeysQuery, KeysResponse, MgetRequest,
    MgetResponse, MsetFailure, MsetRequest, MsetResponse, OperationsQuery, PatternQuery,
    PatternRequest, PatternResponse, RemovedResponse, SetRequest, SetResponse,
    TagEntriesResponse, TtlResponse,
};
use crate::tasks::{ClusterMessage, ClusterNode};

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub cache: CacheHandle,
}

impl AppState {
    pub fn new(cache: CacheHandle) -> Self {
        Self { cache }
    }

    /// Builds the cache from configuration and wraps it.
    pub async fn from_config(config: CacheConfig) -> Self {
        Self::new(CacheHandle::new(config).await)
    }
}

// == Key/Value Handlers ==
/// Handler for PUT /set
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let ttl = req.ttl();
    state
        .cache
        .set(req.key.clone(), CacheValue::from_json(req.value), ttl)
        .await?;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    match state.cache.get(&key).await {
        Some(value) => Ok(Json(GetResponse::new(key, &value))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if !state.cache.delete(&key).await {
        return Err(CacheError::NotFound(key));
    }
    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for POST /mget
pub async fn mget_handler(
    State(state): State<AppState>,
    Json(req): Json<MgetRequest>,
) -> Json<MgetResponse> {
    let found = state.cache.mget(&req.keys).await;
    Json(MgetResponse::new(found))
}

/// Handler for POST /mset
///
/// Keys that fail are listed in the response; the others stay stored.
pub async fn mset_handler(
    State(state): State<AppState>,
    Json(req): Json<MsetRequest>,
) -> Result<Json<MsetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let ttl = req.ttl_ms.map(Duration::from_millis);
    let entries = req
        .entries
        .into_iter()
        .map(|(key, value)| (key, CacheValue::from_json(value)));
    let report = state.cache.mset(entries, ttl).await;

    Ok(Json(MsetResponse {
        stored: report.stored,
        failed: report
            .failed
            .into_iter()
            .map(|(key, err)| MsetFailure {
                key,
                error: err.to_string(),
            })
            .collect(),
    }))
}

/// Handler for GET /exists/:key
pub async fn exists_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<ExistsResponse> {
    let exists = state.cache.exists(&key).await;
    Json(ExistsResponse { key, exists })
}

/// Handler for GET /keys?pattern=
pub async fn keys_handler(
    State(state): State<AppState>,
    Query(query): Query<KeysQuery>,
) -> Result<Json<KeysResponse>> {
    let keys = state.cache.keys(query.pattern.as_deref()).await?;
    Ok(Json(KeysResponse::new(keys)))
}

/// Handler for POST /clear
pub async fn clear_handler(State(state): State<AppState>) -> Json<AckResponse> {
    state.cache.clear().await;
    Json(AckResponse::new("Cache cleared"))
}

// == TTL Handlers ==
/// Handler for POST /expire/:key
pub async fn expire_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<ExpireRequest>,
) -> Result<Json<ExpireResponse>> {
    if let Some(error_msg) = validate_key(&key) {
        return Err(CacheError::InvalidRequest(error_msg));
    }
    if !state
        .cache
        .expire(&key, Duration::from_millis(req.ttl_ms))
        .await
    {
        return Err(CacheError::NotFound(key));
    }
    Ok(Json(ExpireResponse {
        key,
        ttl_ms: req.ttl_ms,
    }))
}

/// Handler for GET /ttl/:key
pub async fn ttl_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<TtlResponse> {
    let status = state.cache.ttl(&key).await;
    Json(TtlResponse::new(key, status))
}

// == Tag Handlers ==
/// Handler for GET /tags/:tag
pub async fn get_tag_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Json<TagEntriesResponse> {
    let entries = state
        .cache
        .get_by_tag(&tag)
        .await
        .into_iter()
        .map(|(key, value)| (key, value.to_json()))
        .collect();
    Json(TagEntriesResponse { tag, entries })
}

/// Handler for DELETE /tags/:tag
pub async fn delete_tag_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Json<RemovedResponse> {
    let removed = state.cache.delete_by_tag(&tag).await;
    Json(RemovedResponse { removed })
}

/// Handler for GET /patterns
pub async fn list_patterns_handler(State(state): State<AppState>) -> Json<Vec<PatternResponse>> {
    let patterns = state
        .cache
        .patterns()
        .iter()
        .map(|(pattern, config)| PatternResponse::new(pattern.as_str(), config))
        .collect();
    Json(patterns)
}

/// Handler for POST /patterns
pub async fn add_pattern_handler(
    State(state): State<AppState>,
    Json(req): Json<PatternRequest>,
) -> Result<Json<PatternResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let (pattern, config) = req.into_parts();
    state.cache.add_pattern(&pattern, config.clone())?;
    Ok(Json(PatternResponse::new(pattern, &config)))
}

/// Handler for DELETE /patterns?pattern=
pub async fn remove_pattern_handler(
    State(state): State<AppState>,
    Query(query): Query<PatternQuery>,
) -> Result<Json<AckResponse>> {
    if !state.cache.remove_pattern(&query.pattern) {
        return Err(CacheError::NotFound(query.pattern));
    }
    Ok(Json(AckResponse::new(format!(
        "Pattern '{}' removed",
        query.pattern
    ))))
}

/// Handler for POST /invalidate
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<RemovedResponse>> {
    let removed = state.cache.invalidate_pattern(&req.pattern).await?;
    Ok(Json(RemovedResponse { removed }))
}

// == Observability Handlers ==
/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.get_stats().await)
}

/// Handler for GET /operations?limit=
pub async fn operations_handler(
    State(state): State<AppState>,
    Query(query): Query<OperationsQuery>,
) -> Json<Vec<Operation>> {
    Json(state.cache.get_operations(query.limit))
}

// == Cluster Handlers ==
/// Handler for GET /cluster/nodes
pub async fn cluster_nodes_handler(State(state): State<AppState>) -> Json<Vec<ClusterNode>> {
    Json(state.cache.cluster_nodes())
}

/// Handler for POST /cluster/sync
///
/// Peer notifications are advisory: they are logged and acknowledged, and
/// never applied to the local store.
pub async fn cluster_sync_handler(Json(message): Json<ClusterMessage>) -> Json<AckResponse> {
    info!(
        origin = %message.origin,
        op = ?message.op,
        sent_at = %message.timestamp,
        "Received cluster notification"
    );
    Json(AckResponse::new("ok"))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlStatus;
    use serde_json::json;

    async fn test_state() -> AppState {
        AppState::from_config(CacheConfig {
            max_size: 100,
            default_ttl: None,
            cleanup_interval: Duration::ZERO,
            ..CacheConfig::default()
        })
        .await
    }

    fn set_request(key: &str, value: serde_json::Value) -> SetRequest {
        SetRequest {
            key: key.to_string(),
            value,
            ttl_ms: None,
        }
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let state = test_state().await;

        let req = set_request("test_key", json!("test_value"));
        let result = set_handler(State(state.clone()), Json(req)).await;
        assert!(result.is_ok());

        let response = get_handler(State(state.clone()), Path("test_key".to_string()))
            .await
            .unwrap();
        assert_eq!(response.value, json!("test_value"));
    }

    #[tokio::test]
    async fn test_structured_value_round_trips() {
        let state = test_state().await;

        let req = set_request("doc", json!({"id": 7, "tags": ["a"]}));
        set_handler(State(state.clone()), Json(req)).await.unwrap();

        let response = get_handler(State(state), Path("doc".to_string()))
            .await
            .unwrap();
        assert_eq!(response.value, json!({"id": 7, "tags": ["a"]}));
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let state = test_state().await;

        let result = get_handler(State(state), Path("nonexistent".to_string())).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_handler() {
        let state = test_state().await;
        let req = set_request("to_delete", json!("value"));
        set_handler(State(state.clone()), Json(req)).await.unwrap();

        let result = delete_handler(State(state.clone()), Path("to_delete".to_string())).await;
        assert!(result.is_ok());

        // Second delete reports the key as missing
        let result = delete_handler(State(state), Path("to_delete".to_string())).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_set_invalid_request() {
        let state = test_state().await;

        let req = set_request("", json!("value"));
        let result = set_handler(State(state), Json(req)).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_expire_and_ttl_handlers() {
        let state = test_state().await;
        let req = set_request("k", json!("v"));
        set_handler(State(state.clone()), Json(req)).await.unwrap();

        let response = ttl_handler(State(state.clone()), Path("k".to_string())).await;
        assert_eq!(response.ttl, TtlStatus::NoTtl.code());

        expire_handler(
            State(state.clone()),
            Path("k".to_string()),
            Json(ExpireRequest { ttl_ms: 60_000 }),
        )
        .await
        .unwrap();
        let response = ttl_handler(State(state.clone()), Path("k".to_string())).await;
        assert!(response.ttl > 0 && response.ttl <= 60_000);

        let result = expire_handler(
            State(state),
            Path("missing".to_string()),
            Json(ExpireRequest { ttl_ms: 1 }),
        )
        .await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_pattern_handlers() {
        let state = test_state().await;

        let req = PatternRequest {
            pattern: "user:*".into(),
            tags: vec!["users".into()],
            ttl_ms: None,
            compress: None,
        };
        add_pattern_handler(State(state.clone()), Json(req))
            .await
            .unwrap();
        set_handler(State(state.clone()), Json(set_request("user:1", json!(1))))
            .await
            .unwrap();

        let listed = list_patterns_handler(State(state.clone())).await;
        assert_eq!(listed.len(), 1);

        let tagged = get_tag_handler(State(state.clone()), Path("users".to_string())).await;
        assert_eq!(tagged.entries.len(), 1);

        let removed = delete_tag_handler(State(state.clone()), Path("users".to_string())).await;
        assert_eq!(removed.removed, 1);

        let query = PatternQuery {
            pattern: "user:*".into(),
        };
        remove_pattern_handler(State(state.clone()), Query(query.clone()))
            .await
            .unwrap();
        let result = remove_pattern_handler(State(state), Query(query)).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let state = test_state().await;

        let response = stats_handler(State(state)).await;
        assert_eq!(response.hits, 0);
        assert_eq!(response.misses, 0);
    }

    #[tokio::test]
    async fn test_cluster_sync_handler_acks() {
        let message: ClusterMessage = serde_json::from_value(json!({
            "origin": "node-b",
            "op": {"op": "delete", "key": "k"},
            "timestamp": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        let response = cluster_sync_handler(Json(message)).await;
        assert_eq!(response.message, "ok");
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}

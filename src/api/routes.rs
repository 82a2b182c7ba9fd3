//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    add_pattern_handler, clear_handler, cluster_nodes_handler, cluster_sync_handler,
    delete_handler, delete_tag_handler, exists_handler, expire_handler, get_handler,
    get_tag_handler, health_handler, invalidate_handler, keys_handler, list_patterns_handler,
    mget_handler, mset_handler, operations_handler, remove_pattern_handler, set_handler,
    stats_handler, ttl_handler, AppState,
};
use crate::tasks::cluster::CLUSTER_SYNC_PATH;

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/set", put(set_handler))
        .route("/get/:key", get(get_handler))
        .route("/del/:key", delete(delete_handler))
        .route("/mget", post(mget_handler))
        .route("/mset", post(mset_handler))
        .route("/expire/:key", post(expire_handler))
        .route("/ttl/:key", get(ttl_handler))
        .route("/exists/:key", get(exists_handler))
        .route("/keys", get(keys_handler))
        .route("/clear", post(clear_handler))
        .route("/tags/:tag", get(get_tag_handler).delete(delete_tag_handler))
        .route(
            "/patterns",
            get(list_patterns_handler)
                .post(add_pattern_handler)
                .delete(remove_pattern_handler),
        )
        .route("/invalidate", post(invalidate_handler))
        .route("/stats", get(stats_handler))
        .route("/operations", get(operations_handler))
        .route("/cluster/nodes", get(cluster_nodes_handler))
        .route(CLUSTER_SYNC_PATH, post(cluster_sync_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

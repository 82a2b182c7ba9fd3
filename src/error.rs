//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache engine and its HTTP surface.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Value could not be serialized or compressed; the `set` was aborted
    #[error("Encode error: {0}")]
    Encode(String),

    /// Stored bytes could not be decompressed or deserialized
    #[error("Decode error: {0}")]
    Decode(String),

    /// Eviction could not free a slot; the caller may retry
    #[error("Capacity exhausted: {0}")]
    CapacityExhausted(String),

    /// Snapshot could not be written or read
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A cluster peer could not be notified
    #[error("Cluster sync error: {0}")]
    ClusterSync(String),

    /// Invalid request data (malformed glob, bad HTTP input)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Key not found (HTTP surface only; the engine reports misses as `None`)
    #[error("Key not found: {0}")]
    NotFound(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) | CacheError::Encode(_) => StatusCode::BAD_REQUEST,
            CacheError::CapacityExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Decode(_) | CacheError::Persistence(_) | CacheError::ClusterSync(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;

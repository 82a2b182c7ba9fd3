//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheValue, TagConfig, TtlStatus};

/// Response body for the GET operation (GET /get/:key)
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    /// The requested key
    pub key: String,
    /// The stored value
    pub value: Value,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: &CacheValue) -> Self {
        Self {
            key: key.into(),
            value: value.to_json(),
        }
    }
}

/// Response body for the SET operation (PUT /set)
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
}

impl SetResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }
}

/// Response body for the DELETE operation (DELETE /del/:key)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The key that was deleted
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for POST /mget: only the keys that hit.
#[derive(Debug, Clone, Serialize)]
pub struct MgetResponse {
    pub values: BTreeMap<String, Value>,
}

impl MgetResponse {
    pub fn new<I>(values: I) -> Self
    where
        I: IntoIterator<Item = (String, CacheValue)>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(key, value)| (key, value.to_json()))
                .collect(),
        }
    }
}

/// One key `mset` could not store.
#[derive(Debug, Clone, Serialize)]
pub struct MsetFailure {
    pub key: String,
    pub error: String,
}

/// Response body for POST /mset
#[derive(Debug, Clone, Serialize)]
pub struct MsetResponse {
    pub stored: Vec<String>,
    pub failed: Vec<MsetFailure>,
}

/// Response body for GET /ttl/:key
///
/// `ttl` is the remaining lifetime in milliseconds, `-1` for no TTL and
/// `-2` for a missing or stale key.
#[derive(Debug, Clone, Serialize)]
pub struct TtlResponse {
    pub key: String,
    pub ttl: i64,
}

impl TtlResponse {
    pub fn new(key: impl Into<String>, status: TtlStatus) -> Self {
        Self {
            key: key.into(),
            ttl: status.code(),
        }
    }
}

/// Response body for POST /expire/:key
#[derive(Debug, Clone, Serialize)]
pub struct ExpireResponse {
    pub key: String,
    pub ttl_ms: u64,
}

/// Response body for GET /exists/:key
#[derive(Debug, Clone, Serialize)]
pub struct ExistsResponse {
    pub key: String,
    pub exists: bool,
}

/// Response body for GET /keys
#[derive(Debug, Clone, Serialize)]
pub struct KeysResponse {
    pub count: usize,
    pub keys: Vec<String>,
}

impl KeysResponse {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            count: keys.len(),
            keys,
        }
    }
}

/// Response body for GET /tags/:tag
#[derive(Debug, Clone, Serialize)]
pub struct TagEntriesResponse {
    pub tag: String,
    pub entries: BTreeMap<String, Value>,
}

/// Response body for bulk removals (DELETE /tags/:tag, POST /invalidate)
#[derive(Debug, Clone, Serialize)]
pub struct RemovedResponse {
    pub removed: usize,
}

/// One registered tag pattern (GET/POST /patterns)
#[derive(Debug, Clone, Serialize)]
pub struct PatternResponse {
    pub pattern: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress: Option<bool>,
}

impl PatternResponse {
    pub fn new(pattern: impl Into<String>, config: &TagConfig) -> Self {
        Self {
            pattern: pattern.into(),
            tags: config.tags.clone(),
            ttl_ms: config
                .ttl
                .map(|ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
            compress: config.compress,
        }
    }
}

/// Generic acknowledgement (POST /clear, POST /cluster/sync)
#[derive(Debug, Clone, Serialize)]
pub struct AckResponse {
    pub message: String,
}

impl AckResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_get_response_renders_raw_and_structured() {
        let raw = GetResponse::new("a", &CacheValue::from("text"));
        assert_eq!(serde_json::to_value(&raw).unwrap()["value"], "text");

        let structured = GetResponse::new("b", &CacheValue::from(json!({"n": 1})));
        assert_eq!(serde_json::to_value(&structured).unwrap()["value"]["n"], 1);
    }

    #[test]
    fn test_set_and_delete_response_messages() {
        let set = serde_json::to_string(&SetResponse::new("my_key")).unwrap();
        assert!(set.contains("my_key"));
        assert!(set.contains("successfully"));

        let deleted = serde_json::to_string(&DeleteResponse::new("gone")).unwrap();
        assert!(deleted.contains("deleted"));
    }

    #[test]
    fn test_ttl_response_codes() {
        assert_eq!(TtlResponse::new("k", TtlStatus::NoTtl).ttl, -1);
        assert_eq!(TtlResponse::new("k", TtlStatus::Expired).ttl, -2);
        assert_eq!(TtlResponse::new("k", TtlStatus::Fresh(1500)).ttl, 1500);
    }

    #[test]
    fn test_pattern_response_omits_unset_hints() {
        let config = TagConfig::new(["user"]);
        let json = serde_json::to_value(PatternResponse::new("user:*", &config)).unwrap();
        assert!(json.get("ttl_ms").is_none());
        assert!(json.get("compress").is_none());

        let config = config.with_ttl(Duration::from_secs(2));
        let json = serde_json::to_value(PatternResponse::new("user:*", &config)).unwrap();
        assert_eq!(json["ttl_ms"], 2000);
    }

    #[test]
    fn test_keys_response_counts() {
        let resp = KeysResponse::new(vec!["a".into(), "b".into()]);
        assert_eq!(resp.count, 2);
    }

    #[test]
    fn test_health_response_serialize() {
        let json = serde_json::to_string(&HealthResponse::healthy()).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_error_response_serialize() {
        let json = serde_json::to_string(&ErrorResponse::new("Something went wrong")).unwrap();
        assert!(json.contains("error"));
        assert!(json.contains("Something went wrong"));
    }
}

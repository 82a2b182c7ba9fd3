//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::cache::TagConfig;

/// Longest key accepted over HTTP
pub const MAX_KEY_LENGTH: usize = 256;

/// Checks a key received over HTTP.
///
/// Returns an error message if validation fails, None if valid.
pub fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {} characters",
            MAX_KEY_LENGTH
        ));
    }
    None
}

/// Request body for the SET operation (PUT /set)
///
/// A JSON string value is stored as raw bytes, any other JSON value as a
/// structured value.
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// The value to store
    pub value: Value,
    /// Optional TTL in milliseconds (pattern TTL or default if not specified)
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

impl SetRequest {
    pub fn validate(&self) -> Option<String> {
        validate_key(&self.key)
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms.map(Duration::from_millis)
    }
}

/// Request body for POST /mget
#[derive(Debug, Clone, Deserialize)]
pub struct MgetRequest {
    pub keys: Vec<String>,
}

/// Request body for POST /mset
#[derive(Debug, Clone, Deserialize)]
pub struct MsetRequest {
    pub entries: BTreeMap<String, Value>,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

impl MsetRequest {
    /// Returns the first invalid key's message, if any.
    pub fn validate(&self) -> Option<String> {
        if self.entries.is_empty() {
            return Some("At least one entry is required".to_string());
        }
        self.entries.keys().find_map(|key| validate_key(key))
    }
}

/// Request body for POST /expire/:key
#[derive(Debug, Clone, Deserialize)]
pub struct ExpireRequest {
    pub ttl_ms: u64,
}

/// Request body for POST /patterns
#[derive(Debug, Clone, Deserialize)]
pub struct PatternRequest {
    pub pattern: String,
    pub tags: Vec<String>,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    #[serde(default)]
    pub compress: Option<bool>,
}

impl PatternRequest {
    pub fn validate(&self) -> Option<String> {
        if self.pattern.is_empty() {
            return Some("Pattern cannot be empty".to_string());
        }
        if self.tags.iter().any(|tag| tag.is_empty()) {
            return Some("Tags cannot be empty".to_string());
        }
        None
    }

    pub fn into_parts(self) -> (String, TagConfig) {
        let config = TagConfig {
            tags: self.tags.into_iter().collect(),
            ttl: self.ttl_ms.map(Duration::from_millis),
            compress: self.compress,
        };
        (self.pattern, config)
    }
}

/// Request body for POST /invalidate
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    pub pattern: String,
}

/// Query string for GET /keys
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeysQuery {
    #[serde(default)]
    pub pattern: Option<String>,
}

/// Query string for DELETE /patterns
#[derive(Debug, Clone, Deserialize)]
pub struct PatternQuery {
    pub pattern: String,
}

/// Query string for GET /operations
#[derive(Debug, Clone, Deserialize)]
pub struct OperationsQuery {
    #[serde(default = "default_operations_limit")]
    pub limit: usize,
}

fn default_operations_limit() -> usize {
    100
}

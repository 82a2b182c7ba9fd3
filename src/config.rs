//! Configuration Module
//!
//! Engine options (`CacheConfig`) and the server configuration loaded from
//! environment variables (`Config`).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::TagConfig;

/// Options recognized by the cache engine.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries the cache can hold
    pub max_size: usize,
    /// TTL applied when neither the caller nor a tag pattern provides one
    pub default_ttl: Option<Duration>,
    /// Interval between active sweeps; zero disables the sweep task
    pub cleanup_interval: Duration,
    /// Encoded size in bytes at which values get compressed
    pub compression_threshold: usize,
    /// Write snapshots of the entry table to `persist_path`
    pub persist_to_disk: bool,
    /// Snapshot file location
    pub persist_path: PathBuf,
    /// Keep the bounded operation log
    pub enable_stats: bool,
    /// Notify peers about local mutations
    pub enable_clustering: bool,
    /// Peer addresses as `host:port`
    pub cluster_peers: Vec<String>,
    /// Identifier sent to peers as the message origin
    pub node_id: String,
    /// Upper bound for a single peer notification
    pub cluster_sync_timeout: Duration,
    /// Tag patterns registered at startup
    pub tag_patterns: Vec<(String, TagConfig)>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            default_ttl: Some(Duration::from_secs(3600)),
            cleanup_interval: Duration::from_secs(60),
            compression_threshold: 1024,
            persist_to_disk: false,
            persist_path: PathBuf::from("cache_snapshot.json"),
            enable_stats: true,
            enable_clustering: false,
            cluster_peers: Vec::new(),
            node_id: "node-3000".to_string(),
            cluster_sync_timeout: Duration::from_secs(2),
            tag_patterns: Vec::new(),
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Engine options
    pub cache: CacheConfig,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_SIZE` - Maximum cache entries (default: 1000)
    /// - `DEFAULT_TTL_MS` - Default TTL in milliseconds, 0 for none (default: 3600000)
    /// - `CLEANUP_INTERVAL_MS` - Sweep frequency, 0 disables (default: 60000)
    /// - `COMPRESSION_THRESHOLD` - Compression threshold in bytes (default: 1024)
    /// - `PERSIST_TO_DISK` / `PERSIST_PATH` - Snapshotting (default: false / cache_snapshot.json)
    /// - `ENABLE_STATS` - Operation log (default: true)
    /// - `ENABLE_CLUSTERING` / `CLUSTER_PEERS` - Peer sync (default: false / none)
    /// - `NODE_ID` - Origin sent to peers (default: node-<port>)
    /// - `CLUSTER_SYNC_TIMEOUT_MS` - Per-peer notification timeout (default: 2000)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = CacheConfig::default();
        let server_port = env_parse("SERVER_PORT").unwrap_or(3000);

        let default_ttl = match env_parse::<u64>("DEFAULT_TTL_MS") {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => defaults.default_ttl,
        };

        let cache = CacheConfig {
            max_size: env_parse("MAX_SIZE").unwrap_or(defaults.max_size),
            default_ttl,
            cleanup_interval: env_parse("CLEANUP_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.cleanup_interval),
            compression_threshold: env_parse("COMPRESSION_THRESHOLD")
                .unwrap_or(defaults.compression_threshold),
            persist_to_disk: env_flag("PERSIST_TO_DISK").unwrap_or(defaults.persist_to_disk),
            persist_path: env::var("PERSIST_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.persist_path),
            enable_stats: env_flag("ENABLE_STATS").unwrap_or(defaults.enable_stats),
            enable_clustering: env_flag("ENABLE_CLUSTERING")
                .unwrap_or(defaults.enable_clustering),
            cluster_peers: env::var("CLUSTER_PEERS")
                .map(|v| parse_peer_list(&v))
                .unwrap_or_default(),
            node_id: env::var("NODE_ID").unwrap_or_else(|_| format!("node-{}", server_port)),
            cluster_sync_timeout: env_parse("CLUSTER_SYNC_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.cluster_sync_timeout),
            tag_patterns: Vec::new(),
        };

        Self { server_port, cache }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cache: CacheConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name).ok().and_then(|v| parse_flag(&v))
}

/// Accepts `true/false`, `1/0`, `yes/no` and `on/off`.
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Splits a comma-separated peer list, dropping blanks.
pub fn parse_peer_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

//! Cluster Peer Notification
//!
//! Best-effort hook that tells peer nodes about local mutations. Peers are
//! notified over HTTP from a background worker; a failed notification marks
//! the peer inactive and never affects the local operation. There is no
//! replication, leader election or quorum here.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::StatsRecorder;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

/// Path peers accept notifications on.
pub const CLUSTER_SYNC_PATH: &str = "/cluster/sync";

// == Cluster Node ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Active,
    Inactive,
    Syncing,
}

/// Advisory bookkeeping about one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterNode {
    pub node_id: String,
    pub host: String,
    pub port: u16,
    pub status: NodeStatus,
    pub last_sync: Option<DateTime<Utc>>,
}

impl ClusterNode {
    /// Parses a `host:port` peer address.
    pub fn parse(address: &str) -> Result<Self> {
        let (host, port) = address
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| CacheError::InvalidRequest(format!("peer '{}' is not host:port", address)))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| CacheError::InvalidRequest(format!("peer '{}' has an invalid port", address)))?;
        if host.is_empty() {
            return Err(CacheError::InvalidRequest(format!(
                "peer '{}' has an empty host",
                address
            )));
        }

        Ok(Self {
            node_id: format!("{}:{}", host, port),
            host: host.to_string(),
            port,
            status: NodeStatus::Active,
            last_sync: None,
        })
    }

    pub fn sync_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, CLUSTER_SYNC_PATH)
    }
}

// == Messages ==
/// Description of a local mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ClusterOp {
    Set { key: String, ttl_ms: Option<u64> },
    Delete { key: String },
    Clear,
}

/// Payload POSTed to peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMessage {
    pub origin: String,
    pub op: ClusterOp,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
enum ClusterCommand {
    Notify(ClusterMessage),
    Shutdown,
}

// == Worker ==
/// Handle to the peer notification worker.
#[derive(Debug)]
pub struct ClusterWorker {
    node_id: String,
    tx: mpsc::UnboundedSender<ClusterCommand>,
    nodes: Arc<RwLock<Vec<ClusterNode>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterWorker {
    /// Parses the configured peers and starts the worker. Unparseable peer
    /// addresses are skipped with a warning.
    pub fn spawn(config: &CacheConfig, stats: Arc<StatsRecorder>) -> Self {
        let nodes: Vec<ClusterNode> = config
            .cluster_peers
            .iter()
            .filter_map(|address| match ClusterNode::parse(address) {
                Ok(node) => Some(node),
                Err(err) => {
                    warn!(peer = %address, error = %err, "Ignoring cluster peer");
                    None
                }
            })
            .collect();
        info!(
            node_id = %config.node_id,
            peers = nodes.len(),
            "Cluster notifications enabled"
        );

        let nodes = Arc::new(RwLock::new(nodes));
        let (tx, rx) = mpsc::unbounded_channel();
        let client = reqwest::Client::new();
        let task = tokio::spawn(run_worker(
            rx,
            Arc::clone(&nodes),
            client,
            stats,
            config.cluster_sync_timeout,
        ));

        Self {
            node_id: config.node_id.clone(),
            tx,
            nodes,
            task: Mutex::new(Some(task)),
        }
    }

    /// Queues a notification for every active peer.
    pub fn notify(&self, op: ClusterOp) {
        let message = ClusterMessage {
            origin: self.node_id.clone(),
            op,
            timestamp: Utc::now(),
        };
        if self.tx.send(ClusterCommand::Notify(message)).is_err() {
            debug!("Cluster worker stopped, dropping notification");
        }
    }

    /// Current node table.
    pub fn nodes(&self) -> Vec<ClusterNode> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Delivers queued notifications, then stops the worker.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(ClusterCommand::Shutdown);
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<ClusterCommand>,
    nodes: Arc<RwLock<Vec<ClusterNode>>>,
    client: reqwest::Client,
    stats: Arc<StatsRecorder>,
    timeout: Duration,
) {
    while let Some(command) = rx.recv().await {
        match command {
            ClusterCommand::Notify(message) => {
                sync_peers(&client, &nodes, &stats, &message, timeout).await
            }
            ClusterCommand::Shutdown => break,
        }
    }
    debug!("Cluster worker stopped");
}

async fn sync_peers(
    client: &reqwest::Client,
    nodes: &RwLock<Vec<ClusterNode>>,
    stats: &StatsRecorder,
    message: &ClusterMessage,
    timeout: Duration,
) {
    let targets: Vec<(usize, String)> = {
        let mut nodes = nodes.write().unwrap_or_else(PoisonError::into_inner);
        nodes
            .iter_mut()
            .enumerate()
            .filter(|(_, node)| node.status == NodeStatus::Active)
            .map(|(index, node)| {
                node.status = NodeStatus::Syncing;
                (index, node.sync_url())
            })
            .collect()
    };
    if targets.is_empty() {
        return;
    }

    let calls = targets.into_iter().map(|(index, url)| async move {
        let result = client
            .post(&url)
            .timeout(timeout)
            .json(message)
            .send()
            .await
            .and_then(|response| response.error_for_status());
        (index, url, result)
    });
    let results = join_all(calls).await;

    let mut nodes = nodes.write().unwrap_or_else(PoisonError::into_inner);
    for (index, url, result) in results {
        let Some(node) = nodes.get_mut(index) else {
            continue;
        };
        match result {
            Ok(_) => {
                node.status = NodeStatus::Active;
                node.last_sync = Some(Utc::now());
                debug!(peer = %node.node_id, "Peer notified");
            }
            Err(err) => {
                node.status = NodeStatus::Inactive;
                stats.record_cluster_sync_error();
                let err = CacheError::ClusterSync(format!("{}: {}", url, err));
                warn!(peer = %node.node_id, error = %err, "Peer notification failed, marking inactive");
            }
        }
    }
}

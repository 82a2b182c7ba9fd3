//! Snapshot Persistence
//!
//! Background worker that writes the entry table and counters to disk after
//! mutations, plus the loader used at startup. Snapshots are advisory: a
//! failed write is logged and counted, never reported to the caller.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStats, WeakCacheHandle};
use crate::error::{CacheError, Result};

/// Format version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

// == Snapshot ==
/// On-disk image of the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub entries: HashMap<String, CacheEntry>,
    pub stats: CacheStats,
}

impl Snapshot {
    pub fn new(entries: HashMap<String, CacheEntry>, stats: CacheStats) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            entries,
            stats,
        }
    }
}

/// Writes a snapshot through a temporary file and a rename.
pub async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let bytes = serde_json::to_vec(snapshot)
        .map_err(|e| CacheError::Persistence(format!("serialize snapshot: {}", e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CacheError::Persistence(format!("create {}: {}", parent.display(), e)))?;
    }

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| CacheError::Persistence(format!("write {}: {}", tmp.display(), e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| CacheError::Persistence(format!("rename to {}: {}", path.display(), e)))?;

    Ok(())
}

/// Reads the last written snapshot. A missing file is `Ok(None)`.
pub async fn load_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CacheError::Persistence(format!(
                "read {}: {}",
                path.display(),
                e
            )))
        }
    };

    let snapshot: Snapshot = serde_json::from_slice(&bytes)
        .map_err(|e| CacheError::Persistence(format!("parse {}: {}", path.display(), e)))?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(CacheError::Persistence(format!(
            "unsupported snapshot version {}",
            snapshot.version
        )));
    }
    Ok(Some(snapshot))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

// == Worker ==
#[derive(Debug)]
enum PersistCommand {
    Save,
    /// Write a final snapshot, acknowledge, then stop
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the snapshot worker task.
#[derive(Debug)]
pub struct PersistenceWorker {
    tx: mpsc::UnboundedSender<PersistCommand>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PersistenceWorker {
    pub fn spawn(cache: WeakCacheHandle, path: PathBuf) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        info!(path = %path.display(), "Snapshot persistence enabled");
        let task = tokio::spawn(run_worker(cache, path, rx));

        Self {
            tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Requests a snapshot without waiting for it.
    pub fn schedule(&self) {
        if self.tx.send(PersistCommand::Save).is_err() {
            debug!("Snapshot worker stopped, skipping snapshot request");
        }
    }

    /// Flushes a final snapshot and waits for the worker to exit.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(PersistCommand::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }

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
    cache: WeakCacheHandle,
    path: PathBuf,
    mut rx: mpsc::UnboundedReceiver<PersistCommand>,
) {
    while let Some(command) = rx.recv().await {
        let mut acks = Vec::new();
        let mut stop = false;
        let mut absorb = |command: PersistCommand| {
            if let PersistCommand::Shutdown(ack) = command {
                acks.push(ack);
                stop = true;
            }
        };

        // Coalesce everything queued behind this request into one write
        absorb(command);
        while let Ok(next) = rx.try_recv() {
            absorb(next);
        }

        match cache.upgrade() {
            Some(cache) => cache.save_snapshot(&path).await,
            None => stop = true,
        }

        for ack in acks {
            let _ = ack.send(());
        }
        if stop {
            break;
        }
    }
    debug!("Snapshot worker stopped");
}

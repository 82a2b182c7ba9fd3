//! Background Tasks Module
//!
//! Contains the tasks that run alongside the cache.
//!
//! # Tasks
//! - TTL Sweep: Removes expired cache entries at configured intervals
//! - Persistence: Writes snapshots of the cache after mutations
//! - Cluster: Notifies peer nodes about local mutations

mod cleanup;
pub mod cluster;
pub mod persistence;

pub use cleanup::spawn_sweep_task;
pub use cluster::{ClusterMessage, ClusterNode, ClusterOp, ClusterWorker, NodeStatus};
pub use persistence::{PersistenceWorker, Snapshot};

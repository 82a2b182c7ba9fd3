//! TTL Sweep Task
//!
//! Background task that periodically removes expired cache entries.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::WeakCacheHandle;

/// Spawns a background task that periodically sweeps expired cache entries.
///
/// The task sleeps for `interval` between passes. It holds only a weak
/// handle, so it stops on its own once every `CacheHandle` is dropped;
/// `CacheHandle::shutdown` aborts it explicitly.
///
/// # Example
/// ```ignore
/// let handle = spawn_sweep_task(cache.downgrade(), Duration::from_secs(60));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_sweep_task(cache: WeakCacheHandle, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting TTL sweep task with interval of {} ms",
            interval.as_millis()
        );

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            let Some(cache) = cache.upgrade() else {
                debug!("Cache dropped, stopping TTL sweep task");
                break;
            };

            let removed = cache.purge_expired().await;

            // Log sweep statistics
            if removed > 0 {
                info!("TTL sweep: removed {} expired entries", removed);
            } else {
                debug!("TTL sweep: no expired entries found");
            }
        }
    })
}

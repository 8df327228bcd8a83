//! Housekeeping Task
//!
//! Background task that periodically purges expired entries from every
//! cache the manager knows about.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::provider::CacheManager;

/// Spawns a background task that purges expired entries at a fixed interval.
///
/// The purge takes store locks, so each run is moved onto the blocking pool.
/// The task stops on its own once the manager is shut down.
///
/// # Arguments
/// * `manager` - Shared cache manager
/// * `interval_secs` - Interval in seconds between purges
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let manager = Arc::new(CacheManager::new(Config::default())?);
/// let housekeeping = spawn_housekeeping_task(Arc::clone(&manager), 60);
/// // Later, during shutdown:
/// housekeeping.abort();
/// ```
pub fn spawn_housekeeping_task(manager: Arc<CacheManager>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting housekeeping task with interval of {} seconds",
            interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            if manager.is_shut_down() {
                debug!("Cache manager shut down, stopping housekeeping");
                break;
            }

            let run = Arc::clone(&manager);
            let purged = match tokio::task::spawn_blocking(move || run.purge_expired()).await {
                Ok(purged) => purged,
                Err(err) => {
                    warn!(error = %err, "Housekeeping run failed");
                    continue;
                }
            };

            if purged > 0 {
                info!("Housekeeping: purged {} expired entries", purged);
            } else {
                debug!("Housekeeping: no expired entries found");
            }
        }
    })
}

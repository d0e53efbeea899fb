//! Background reclamation of expired entries

use super::storage::TaggedStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// Periodically run `cleanup_expired` on the store until `cancel` fires.
///
/// Expired entries are never served even without a reaper; this only
/// returns their memory.
pub fn spawn_reaper(
    store: Arc<dyn TaggedStore>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Cache reaper started (every {:?})", every);
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match store.cleanup_expired().await {
                        Ok(0) => {}
                        Ok(removed) => tracing::debug!("Reaped {} expired cache entries", removed),
                        Err(e) => tracing::error!("Failed to reap expired cache entries: {}", e),
                    }
                }
            }
        }

        tracing::info!("Cache reaper stopped");
    })
}

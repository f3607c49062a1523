// Background persistence: subscribes to merged stats updates and writes them to
// the stats repo; prunes old history on a fixed interval.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::models::StatsUpdate;
use crate::stats_repo::StatsRepo;

pub struct StatsWriterConfig {
    /// How often to prune history past retention (real seconds).
    pub prune_interval_secs: u64,
}

/// Spawns the writer. It exits when the update channel closes or `shutdown` fires.
/// Write failures are logged and never stop the task.
pub fn spawn_stats_writer(
    mut updates: broadcast::Receiver<StatsUpdate>,
    repo: Arc<StatsRepo>,
    config: StatsWriterConfig,
    updates_saved_total: Arc<AtomicU64>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let prune_interval = Duration::from_secs(config.prune_interval_secs);
    tokio::spawn(async move {
        let mut prune_tick = interval(prune_interval);
        prune_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    drain_pending(&mut updates, &repo, &updates_saved_total).await;
                    break;
                }
                result = updates.recv() => {
                    match result {
                        Ok(update) => {
                            if let Err(e) = repo.save_update(&update).await {
                                tracing::warn!(error = %e, operation = "save_update", "stats writer: save failed");
                            } else {
                                updates_saved_total.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "stats writer lagged; updates dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = prune_tick.tick() => {
                    match repo.prune_old_data().await {
                        Ok(removed) => tracing::debug!(operation = "prune_old_data", removed, "old history pruned"),
                        Err(e) => tracing::warn!(error = %e, operation = "prune_old_data", "failed to prune old history"),
                    }
                }
            }
        }
        tracing::debug!("stats writer shutting down");
    })
}

/// Persists whatever was already merged before exit. A lag only means older
/// updates were overwritten; the newer ones behind it are still saved.
async fn drain_pending(
    updates: &mut broadcast::Receiver<StatsUpdate>,
    repo: &StatsRepo,
    updates_saved_total: &AtomicU64,
) {
    loop {
        match updates.try_recv() {
            Ok(update) => {
                if let Err(e) = repo.save_update(&update).await {
                    tracing::warn!(error = %e, operation = "save_update", "stats writer: final save failed");
                } else {
                    updates_saved_total.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "stats writer lagged during shutdown; updates dropped");
            }
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => break,
        }
    }
}

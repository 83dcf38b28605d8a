//! Background eviction of expired request records.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::limiter::RateLimiter;

/// Handle to a running sweeper task.
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn a task that calls [`RateLimiter::sweep_expired`] every `interval`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, interval: Duration) -> SweeperHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "Record sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = limiter.sweep_expired();
                    if removed > 0 {
                        debug!(
                            removed = removed,
                            remaining = limiter.tracked_keys(),
                            "Swept expired request records"
                        );
                    }
                }
                _ = shutdown_rx.changed() => {
                    break;
                }
            }
        }

        info!("Record sweeper stopped");
    });

    SweeperHandle { shutdown_tx, task }
}

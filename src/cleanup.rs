//! Periodic expiry sweeping for the limiter stores.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::rate_limiter::ProgressiveRateLimiter;

/// Default sweep cadence.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(120);

/// Handle to the background sweeper. The task is aborted on `shutdown`
/// or when the handle is dropped.
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop sweeping. Idempotent.
    pub fn shutdown(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn the sweep loop for `limiter`, ticking every `interval`.
pub fn spawn_sweeper(limiter: Arc<ProgressiveRateLimiter>, interval: Duration) -> SweeperHandle {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // the first tick completes immediately; consume it so the first
        // sweep happens one full interval after startup
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let (windows, blocks) = limiter.sweep();
            if windows > 0 || blocks > 0 {
                debug!(windows, blocks, "sweep removed expired entries");
            }
        }
    });

    SweeperHandle { task }
}

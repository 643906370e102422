//! Periodic commit scheduling.
//!
//! Drives the sync engine on a fixed interval. At startup, a cycle runs
//! immediately when the last successful commit is older than the
//! interval (or has never happened); afterwards one cycle runs per
//! tick. The timer and the messaging retry timers are independent and
//! do not block each other.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::engine::SyncEngine;
use crate::error::SyncError;

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Handle to a running commit scheduler.
pub struct CommitScheduler {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl CommitScheduler {
    /// Spawn the scheduler onto the current tokio runtime.
    pub fn spawn(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(run_loop(engine, interval, Arc::clone(&shutdown)));
        Self { shutdown, handle }
    }

    /// Cooperatively stop the scheduler and wait for it to exit.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        let _ = self.handle.await;
    }
}

async fn run_loop(engine: Arc<SyncEngine>, interval: Duration, shutdown: Arc<Notify>) {
    if catch_up_due(&engine, interval) {
        run_cycle(&engine);
    }

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = tokio::time::sleep(interval) => run_cycle(&engine),
        }
    }
    tracing::debug!("commit scheduler stopped");
}

/// Whether the previous success is old enough that the next cycle must
/// run immediately instead of waiting a full interval.
fn catch_up_due(engine: &SyncEngine, interval: Duration) -> bool {
    match engine.last_successful_commit() {
        Ok(Some(last)) => now_ms() - last >= interval.as_millis() as i64,
        Ok(None) => true,
        Err(e) => {
            tracing::warn!(error = %e, "could not read last commit marker");
            true
        }
    }
}

fn run_cycle(engine: &SyncEngine) {
    match engine.commit(now_ms()) {
        Ok(report) => {
            tracing::debug!(
                pushed = report.pushed,
                committed = report.committed,
                failed = report.failed,
                "scheduled commit cycle ran"
            );
        }
        Err(SyncError::AlreadyInProgress) => {
            tracing::debug!("skipping tick; commit cycle still running");
        }
        Err(e) => {
            tracing::warn!(error = %e, "scheduled commit cycle failed");
        }
    }
}

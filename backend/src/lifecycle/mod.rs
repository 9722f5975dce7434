//! Background job lifecycle
//!
//! Owns every background job the server starts (the expiry sweeper and the
//! per-file deferred deletions) so shutdown can cancel and await them instead
//! of leaking detached tasks.

pub mod sweeper;

pub use sweeper::{sweep_once, SweepReport, Sweeper};

use crate::storage::{Deletion, Storage, StoredFile};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Tracks background jobs and their shared cancellation token
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    tracker: TaskTracker,
    token: CancellationToken,
}

impl Lifecycle {
    /// Create a lifecycle manager with no jobs
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a tracked job
    ///
    /// The job should watch [`Lifecycle::token`] if it can run indefinitely.
    /// Shutdown waits for it either way.
    pub fn spawn<F>(&self, job: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(job)
    }

    /// Start the periodic expiry sweeper
    pub fn spawn_sweeper(&self, sweeper: Sweeper) {
        let token = self.token.clone();
        let _ = self.spawn(sweeper.run(token));
    }

    /// Delete `file` once `delay` has elapsed, unless shutdown comes first
    pub fn schedule_deletion(&self, storage: Storage, file: StoredFile, delay: Duration) {
        let token = self.token.clone();
        debug!(file = %file.name, delay_secs = delay.as_secs(), "Scheduled deferred deletion");

        let _ = self.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    match storage.delete(&file).await {
                        Ok(Deletion::Removed) => {
                            debug!(file = %file.name, "Deferred deletion removed file");
                        }
                        Ok(Deletion::AlreadyAbsent) => {
                            debug!(file = %file.name, "File already removed before deferred deletion");
                        }
                        Err(e) => {
                            warn!(file = %file.name, error = %e, "Deferred deletion failed");
                        }
                    }
                }
                _ = token.cancelled() => {
                    // Left for the sweeper of the next run
                    debug!(file = %file.name, "Deferred deletion cancelled by shutdown");
                }
            }
        });
    }

    /// Token cancelled when shutdown begins
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Number of jobs still running
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Whether shutdown has started
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel every job and wait for all of them to finish
    pub async fn shutdown(&self) {
        info!(pending = self.pending(), "Stopping background jobs");
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Background jobs stopped");
    }
}

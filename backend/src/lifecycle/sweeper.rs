//! Expiry sweeper
//!
//! Periodically deletes stored files older than the retention window and
//! evicts finished task records of the same age.

use crate::config::StorageConfig;
use crate::storage::{Deletion, Storage, StorageError, StoredFile};
use crate::worker::WorkerPool;
use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counts from one sweep cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Files looked at
    pub scanned: usize,
    /// Expired files deleted
    pub removed: usize,
    /// Files that could not be checked or deleted
    pub failed: usize,
}

/// Delete every file under the storage root older than `retention`
///
/// Per-file failures are logged and counted; they never stop the sweep.
/// Only a failure to list the root is returned as an error.
pub async fn sweep_once(storage: &Storage, retention: Duration) -> Result<SweepReport, StorageError> {
    sweep_with(storage, retention, |file| {
        let storage = storage.clone();
        async move { storage.delete(&file).await }
    })
    .await
}

async fn sweep_with<D, F>(
    storage: &Storage,
    retention: Duration,
    mut delete: D,
) -> Result<SweepReport, StorageError>
where
    D: FnMut(StoredFile) -> F,
    F: Future<Output = Result<Deletion, StorageError>>,
{
    let mut report = SweepReport::default();

    for file in storage.list().await? {
        report.scanned += 1;

        match storage.is_expired(&file, retention).await {
            Ok(false) => {}
            Ok(true) => {
                let name = file.name.clone();
                match delete(file).await {
                    Ok(Deletion::Removed) => {
                        debug!(file = %name, "Swept expired file");
                        report.removed += 1;
                    }
                    Ok(Deletion::AlreadyAbsent) => {}
                    Err(e) => {
                        warn!(file = %name, error = %e, "Failed to delete expired file");
                        report.failed += 1;
                    }
                }
            }
            // Removed by a deferred deletion between listing and checking
            Err(StorageError::NotFound(_)) => {}
            Err(e) => {
                warn!(file = %file.name, error = %e, "Failed to check file age");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Recurring sweep job
#[derive(Debug, Clone)]
pub struct Sweeper {
    storage: Storage,
    pool: Option<WorkerPool>,
    interval: Duration,
    retention: Duration,
}

impl Sweeper {
    /// Create a sweeper using the configured interval and retention window
    pub fn new(storage: Storage, pool: Option<WorkerPool>, config: &StorageConfig) -> Self {
        Self::with_timing(storage, pool, config.cleanup_interval, config.retention)
    }

    /// Create a sweeper with explicit timing
    pub fn with_timing(
        storage: Storage,
        pool: Option<WorkerPool>,
        interval: Duration,
        retention: Duration,
    ) -> Self {
        Self {
            storage,
            pool,
            interval,
            retention,
        }
    }

    /// Run one cycle: sweep files, then evict old task records
    pub async fn cycle(&self) -> SweepReport {
        let report = match sweep_once(&self.storage, self.retention).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Sweep failed to list storage directory");
                SweepReport::default()
            }
        };

        let mut evicted = 0;
        if let Some(pool) = &self.pool {
            let cutoff = chrono::Duration::from_std(self.retention)
                .ok()
                .and_then(|window| Utc::now().checked_sub_signed(window));
            if let Some(cutoff) = cutoff {
                evicted = pool.evict_finished_before(cutoff).await;
            }
        }

        info!(
            scanned = report.scanned,
            removed = report.removed,
            failed = report.failed,
            evicted_tasks = evicted,
            "Sweep cycle finished"
        );
        report
    }

    /// Sweep every interval until `token` is cancelled
    ///
    /// The first cycle runs one full interval after start.
    pub async fn run(self, token: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            retention_secs = self.retention.as_secs(),
            "Expiry sweeper started"
        );
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.cycle().await;
                }
                _ = token.cancelled() => {
                    info!("Expiry sweeper stopped");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Lifecycle;
    use std::path::Path;
    use std::time::SystemTime;
    use tempfile::tempdir;

    fn age_file(path: &Path, age: Duration) {
        let file = std::fs::File::options()
            .write(true)
            .open(path)
            .expect("Failed to open file");
        file.set_modified(SystemTime::now() - age)
            .expect("Failed to set mtime");
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_files() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let storage = Storage::new(temp_dir.path()).await.unwrap();
        let fresh = storage.put(b"fresh", "pdf").await.unwrap();
        let stale = storage.put(b"stale", "png").await.unwrap();
        age_file(&stale.path, Duration::from_secs(2 * 3600));

        let report = sweep_once(&storage, Duration::from_secs(3600)).await.unwrap();

        assert_eq!(
            report,
            SweepReport {
                scanned: 2,
                removed: 1,
                failed: 0
            }
        );
        assert!(fresh.path.exists());
        assert!(!stale.path.exists());
    }

    #[tokio::test]
    async fn test_failed_deletion_does_not_stop_the_sweep() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let storage = Storage::new(temp_dir.path()).await.unwrap();
        let mut stale = Vec::new();
        for ext in ["pdf", "png", "docx"] {
            let file = storage.put(b"stale", ext).await.unwrap();
            age_file(&file.path, Duration::from_secs(2 * 3600));
            stale.push(file);
        }
        let locked = stale[1].name.clone();

        let report = sweep_with(&storage, Duration::from_secs(3600), |file| {
            let storage = storage.clone();
            let locked = locked.clone();
            async move {
                if file.name == locked {
                    return Err(StorageError::io(
                        file.path.clone(),
                        std::io::Error::other("permission denied"),
                    ));
                }
                storage.delete(&file).await
            }
        })
        .await
        .unwrap();

        assert_eq!(
            report,
            SweepReport {
                scanned: 3,
                removed: 2,
                failed: 1
            }
        );
        assert!(!stale[0].path.exists());
        assert!(stale[1].path.exists());
        assert!(!stale[2].path.exists());
    }

    #[tokio::test]
    async fn test_sweep_of_empty_directory() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let storage = Storage::new(temp_dir.path()).await.unwrap();

        let report = sweep_once(&storage, Duration::ZERO).await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_sweeper_job_runs_until_cancelled() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let storage = Storage::new(temp_dir.path()).await.unwrap();
        let stale = storage.put(b"stale", "pdf").await.unwrap();
        age_file(&stale.path, Duration::from_secs(2 * 3600));

        let lifecycle = Lifecycle::new();
        lifecycle.spawn_sweeper(Sweeper::with_timing(
            storage.clone(),
            None,
            Duration::from_millis(30),
            Duration::from_secs(3600),
        ));
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(!stale.path.exists());
        assert_eq!(lifecycle.pending(), 1);
        lifecycle.shutdown().await;
        assert_eq!(lifecycle.pending(), 0);
    }
}

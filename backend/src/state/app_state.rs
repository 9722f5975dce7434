// Application state management
// Contains configuration, storage, worker pool and background jobs

use crate::config::Config;
use crate::conversion::{ConversionError, ConversionOptions, ConversionOutput, Dispatcher, ToolId};
use crate::lifecycle::{Lifecycle, Sweeper};
use crate::storage::{Storage, StorageError, StoredFile};
use crate::worker::{TaskId, WorkerPool};
use std::sync::Arc;
use tracing::{error, info};

/// State shared by all handlers
///
/// Every field is a cheap handle, so cloning per request is fine.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<Config>,
    /// Storage directory
    pub storage: Storage,
    /// Bounded pool running conversions
    pub pool: WorkerPool,
    /// Owner of background jobs
    pub lifecycle: Lifecycle,
}

impl AppState {
    /// Open the storage directory and build the worker pool
    ///
    /// Background jobs are not started; see [`AppState::start_background_jobs`].
    pub async fn new(config: Config) -> Result<Self, StorageError> {
        let storage = Storage::new(config.storage.upload_dir.clone()).await?;
        let pool = WorkerPool::new(Dispatcher::new(storage.clone()), &config.worker);
        info!(
            upload_dir = %storage.root().display(),
            max_concurrent = pool.capacity(),
            "Application state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            storage,
            pool,
            lifecycle: Lifecycle::new(),
        })
    }

    /// Start the expiry sweeper
    pub fn start_background_jobs(&self) {
        self.lifecycle.spawn_sweeper(Sweeper::new(
            self.storage.clone(),
            Some(self.pool.clone()),
            &self.config.storage,
        ));
    }

    /// Convert a stored upload and settle its files
    ///
    /// On success the original and every output are scheduled for expiry; on
    /// failure the original is deleted (the dispatcher already removed any
    /// output). The work runs as a tracked job, so it finishes and cleans up
    /// even if the caller stops waiting.
    pub async fn convert_upload(
        &self,
        task_id: TaskId,
        original: StoredFile,
        tool: ToolId,
        options: ConversionOptions,
    ) -> Result<ConversionOutput, ConversionError> {
        let state = self.clone();
        let job = self.lifecycle.spawn(async move {
            let result = state
                .pool
                .submit(task_id, original.clone(), tool, options)
                .await;

            match &result {
                Ok(output) if !output.files().is_empty() => {
                    state.expire_later(std::iter::once(&original).chain(output.files()));
                }
                Ok(_) => state.storage.discard(&original).await,
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "Conversion failed");
                    state.storage.discard(&original).await;
                }
            }
            result
        });

        job.await
            .map_err(|e| ConversionError::Processing(format!("Conversion task failed: {}", e)))?
    }

    /// Delete each file once the retention window has passed
    pub fn expire_later<'a>(&self, files: impl IntoIterator<Item = &'a StoredFile>) {
        for file in files {
            self.lifecycle.schedule_deletion(
                self.storage.clone(),
                file.clone(),
                self.config.storage.retention,
            );
        }
    }
}

//! Bounded worker pool
//!
//! Admits at most `capacity` conversions at once. Further submissions wait on
//! the semaphore until a slot frees up. Every admitted task has its terminal
//! outcome recorded in the registry before its slot is released.

use super::task::{ConversionTask, TaskId, TaskRegistry};
use crate::config::WorkerConfig;
use crate::conversion::{ConversionError, ConversionOptions, ConversionOutput, Dispatcher, ToolId};
use crate::storage::StoredFile;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Worker pool gating concurrent conversions
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    pacing: Duration,
    registry: TaskRegistry,
    dispatcher: Dispatcher,
}

impl WorkerPool {
    /// Create a pool from configuration
    pub fn new(dispatcher: Dispatcher, config: &WorkerConfig) -> Self {
        Self::with_capacity(dispatcher, config.max_concurrent, config.pacing)
    }

    /// Create a pool admitting `capacity` tasks at once (at least one)
    pub fn with_capacity(dispatcher: Dispatcher, capacity: usize, pacing: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            pacing,
            registry: TaskRegistry::new(),
            dispatcher,
        }
    }

    /// Convert `input` with `tool` once a slot is free
    ///
    /// The conversion runs on its own task, so dropping the returned future
    /// (a client disconnecting mid-upload) neither cancels the routine nor
    /// leaves its record in `Processing`.
    ///
    /// # Returns
    /// * `Ok(ConversionOutput)` - Task recorded as completed
    /// * `Err(ConversionError)` - Task recorded as failed; error passed through
    pub async fn submit(
        &self,
        task_id: TaskId,
        input: StoredFile,
        tool: ToolId,
        options: ConversionOptions,
    ) -> Result<ConversionOutput, ConversionError> {
        let pool = self.clone();
        let handle = tokio::spawn(async move {
            let dispatcher = pool.dispatcher.clone();
            let file = input.clone();
            pool.run(task_id, input, tool, async move {
                dispatcher.dispatch(tool, &file, options).await
            })
            .await
        });

        handle
            .await
            .map_err(|e| ConversionError::Processing(format!("Conversion task failed: {}", e)))?
    }

    /// Run an arbitrary conversion future under the pool's admission rules
    ///
    /// If this future is dropped after admission, the task is recorded as
    /// failed and only then is its slot released.
    pub async fn run<F>(
        &self,
        task_id: TaskId,
        input: StoredFile,
        tool: ToolId,
        job: F,
    ) -> Result<ConversionOutput, ConversionError>
    where
        F: Future<Output = Result<ConversionOutput, ConversionError>>,
    {
        if self.semaphore.available_permits() == 0 {
            debug!(task_id = %task_id, "All worker slots busy, waiting for admission");
        }
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ConversionError::Processing("Worker pool is closed".to_string()))?;

        let task = ConversionTask::new(task_id, input, tool);
        if !self.registry.insert(task).await {
            return Err(ConversionError::Processing(format!(
                "Duplicate task id: {}",
                task_id
            )));
        }
        let mut admission = Admission {
            task_id,
            registry: self.registry.clone(),
            permit: Some(permit),
            settled: false,
        };
        info!(task_id = %task_id, tool = %tool, running = self.running(), "Task admitted");

        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }

        let result = job.await;

        // Record before the permit drops so no outcome is lost
        match &result {
            Ok(output) => {
                self.registry.complete(&task_id, output.clone()).await;
                info!(task_id = %task_id, outputs = output.files().len(), "Task completed");
            }
            Err(e) => {
                self.registry.fail(&task_id, e.to_string()).await;
                warn!(task_id = %task_id, error = %e, "Task failed");
            }
        }
        admission.settled = true;

        result
    }

    /// Snapshot of a task, if still retained
    pub async fn get(&self, task_id: &TaskId) -> Option<ConversionTask> {
        self.registry.get(task_id).await
    }

    /// Number of tasks currently holding a slot
    pub fn running(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Maximum number of concurrent tasks
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop finished task records older than `cutoff`
    pub async fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        self.registry.evict_finished_before(cutoff).await
    }

    /// The registry backing this pool
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }
}

/// Slot held by an admitted task
///
/// Dropped unsettled, it records the task as failed before releasing the
/// permit.
struct Admission {
    task_id: TaskId,
    registry: TaskRegistry,
    permit: Option<OwnedSemaphorePermit>,
    settled: bool,
}

impl Drop for Admission {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let task_id = self.task_id;
        let registry = self.registry.clone();
        let permit = self.permit.take();
        warn!(task_id = %task_id, "Task dropped before finishing");

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    registry
                        .fail(&task_id, "Task cancelled before completion".to_string())
                        .await;
                    drop(permit);
                });
            }
            Err(_) => {
                warn!(task_id = %task_id, "No runtime to record cancelled task");
            }
        }
    }
}

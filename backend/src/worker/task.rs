//! Conversion task records
//!
//! A task enters the registry as `Processing` when the pool admits it and moves
//! exactly once to `Completed` or `Failed`.

use crate::conversion::{ConversionOutput, ToolId};
use crate::storage::StoredFile;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Unique identifier for a conversion task
pub type TaskId = Uuid;

/// Task status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Admitted and running
    Processing,
    /// The routine returned output
    Completed,
    /// The routine failed
    Failed,
}

impl TaskStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Processing)
    }
}

/// State of one conversion
#[derive(Debug, Clone, Serialize)]
pub struct ConversionTask {
    /// Task identifier
    pub id: TaskId,
    /// Uploaded file being converted
    pub input: StoredFile,
    /// Requested tool
    pub tool: ToolId,
    /// Current status
    pub status: TaskStatus,
    /// When the pool admitted the task
    pub started_at: DateTime<Utc>,
    /// Set when the task completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Set when the task failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    /// Output, present only when completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ConversionOutput>,
    /// Error description, present only when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConversionTask {
    /// New task in the `Processing` state
    pub fn new(id: TaskId, input: StoredFile, tool: ToolId) -> Self {
        Self {
            id,
            input,
            tool,
            status: TaskStatus::Processing,
            started_at: Utc::now(),
            completed_at: None,
            failed_at: None,
            result: None,
            error: None,
        }
    }

    /// Move to `Completed`; returns false if the task already finished
    pub fn complete(&mut self, output: ConversionOutput) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result = Some(output);
        true
    }

    /// Move to `Failed`; returns false if the task already finished
    pub fn fail(&mut self, error: String) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.failed_at = Some(Utc::now());
        self.error = Some(error);
        true
    }

    /// When the task reached a terminal state
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at.or(self.failed_at)
    }
}

/// Registry of tasks owned by a worker pool
///
/// Cheap to clone; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<TaskId, ConversionTask>>>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task; returns false if the id is already taken
    pub async fn insert(&self, task: ConversionTask) -> bool {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return false;
        }
        tasks.insert(task.id, task);
        true
    }

    /// Mark a task completed; returns false if unknown or already finished
    pub async fn complete(&self, id: &TaskId, output: ConversionOutput) -> bool {
        let mut tasks = self.tasks.write().await;
        tasks
            .get_mut(id)
            .map(|task| task.complete(output))
            .unwrap_or(false)
    }

    /// Mark a task failed; returns false if unknown or already finished
    pub async fn fail(&self, id: &TaskId, error: String) -> bool {
        let mut tasks = self.tasks.write().await;
        tasks
            .get_mut(id)
            .map(|task| task.fail(error))
            .unwrap_or(false)
    }

    /// Snapshot of a task
    pub async fn get(&self, id: &TaskId) -> Option<ConversionTask> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Drop finished tasks whose terminal transition happened before `cutoff`
    ///
    /// Returns the number of evicted records. Running tasks are never evicted.
    pub async fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, task| match task.finished_at() {
            Some(finished) => finished >= cutoff,
            None => true,
        });
        before - tasks.len()
    }

    /// Number of tracked tasks
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Whether no tasks are tracked
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

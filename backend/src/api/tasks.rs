//! Task status endpoint

use crate::error::AppError;
use crate::state::AppState;
use crate::worker::{ConversionTask, TaskId};
use axum::{
    extract::{Path, State},
    Json,
};

/// Snapshot of a conversion task
///
/// Finished tasks stay queryable for the retention window.
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
) -> Result<Json<ConversionTask>, AppError> {
    state
        .pool
        .get(&task_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::TaskNotFound(task_id.to_string()))
}

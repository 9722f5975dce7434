//! Download endpoint

use crate::error::AppError;
use crate::state::AppState;
use crate::storage::StorageError;
use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::info;

/// Stream a stored file to the client
///
/// # Returns
/// * `Ok(Response)` - File bytes as an attachment
/// * `Err(AppError::FileNotFound)` - Unknown, invalid or already deleted name
/// * `Err(AppError::FileExpired)` - Older than the retention window; the file is deleted
pub async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let file = match state.storage.path_for(&filename).await {
        Ok(file) => file,
        Err(StorageError::NotFound(_)) | Err(StorageError::InvalidName(_)) => {
            return Err(AppError::FileNotFound(filename))
        }
        Err(e) => return Err(e.into()),
    };

    match state
        .storage
        .is_expired(&file, state.config.storage.retention)
        .await
    {
        Ok(false) => {}
        Ok(true) => {
            state.storage.discard(&file).await;
            info!(file = %file.name, "Deleted expired file on download");
            return Err(AppError::FileExpired(filename));
        }
        Err(StorageError::NotFound(_)) => return Err(AppError::FileNotFound(filename)),
        Err(e) => return Err(e.into()),
    }

    // The file can vanish between the checks and the open
    let handle = match tokio::fs::File::open(&file.path).await {
        Ok(handle) => handle,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::FileNotFound(filename))
        }
        Err(e) => return Err(StorageError::io(&file.path, e).into()),
    };
    let length = handle
        .metadata()
        .await
        .map_err(|e| StorageError::io(&file.path, e))?
        .len();

    info!(file = %file.name, bytes = length, "Serving download");

    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.name),
        ),
        (header::CONTENT_LENGTH, length.to_string()),
    ];

    Ok((headers, Body::from_stream(ReaderStream::new(handle))).into_response())
}

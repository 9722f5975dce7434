//! Error types and error handling for the application
//!
//! This module defines custom error types that can be converted to HTTP responses.
//! All errors implement `IntoResponse` to provide consistent error formatting.

use crate::conversion::{ConversionError, UnknownTool};
use crate::storage::StorageError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error types
///
/// Each variant maps to one HTTP status via `IntoResponse`.
#[derive(Error, Debug)]
pub enum AppError {
    /// The request carried no file, or a file without a name
    #[error("{0}")]
    NoFile(String),

    /// The file extension is not in the allowed set
    #[error("File type {0} not allowed")]
    UnsupportedFileType(String),

    /// The upload exceeds the configured size limit
    #[error("File too large. Max {0}")]
    FileTooLarge(String),

    /// The requested tool does not exist
    #[error(transparent)]
    UnknownTool(#[from] UnknownTool),

    /// The tool cannot take this kind of input
    #[error("Tool {tool} does not accept .{extension} files")]
    IncompatibleInput {
        /// Requested tool
        tool: String,
        /// Extension of the upload
        extension: String,
    },

    /// The request body could not be read
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No stored file with the requested name
    #[error("File not found")]
    FileNotFound(String),

    /// The stored file outlived the retention window
    #[error("File expired")]
    FileExpired(String),

    /// No task with the requested id is retained
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// The tool has no routine yet
    #[error("{0}")]
    NotImplemented(String),

    /// The conversion routine failed
    #[error("Processing error: {0}")]
    Processing(String),

    /// Storage directory failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Internal server error (catch-all for unexpected errors)
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NoFile(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedFileType(_) => StatusCode::BAD_REQUEST,
            AppError::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnknownTool(_) => StatusCode::BAD_REQUEST,
            AppError::IncompatibleInput { .. } => StatusCode::BAD_REQUEST,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::FileNotFound(_) => StatusCode::NOT_FOUND,
            AppError::FileExpired(_) => StatusCode::GONE,
            AppError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ConversionError> for AppError {
    fn from(e: ConversionError) -> Self {
        match e {
            ConversionError::NotImplemented(_) => AppError::NotImplemented(e.to_string()),
            other => AppError::Processing(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }

        let body = Json(json!({
            "detail": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

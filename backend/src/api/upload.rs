//! Upload endpoint
//!
//! Validates the upload, stores it, converts it through the worker pool and
//! schedules expiry of everything it wrote.

use crate::conversion::{ConversionOptions, ConversionOutput, Quality, ToolId};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Tool used when the request names none
const DEFAULT_TOOL: &str = "compress";

/// Query parameters accepted by `POST /upload`
#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    /// Tool id, e.g. `compress`
    pub tool: Option<String>,
    /// `low`, `medium` or `high`
    pub quality: Option<String>,
}

/// Successful upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Always "success"
    pub status: String,
    /// Human readable summary
    pub message: String,
    /// Download path of the primary output
    pub download_url: String,
    /// Upload id shared by the original and its outputs
    pub file_id: String,
    /// File name as sent by the client
    pub original_name: String,
    /// Stored name of the primary output
    pub processed_name: String,
    /// Size of the upload in bytes
    pub file_size: usize,
    /// Conversion task id, queryable at `/tasks/{task_id}`
    pub task_id: Uuid,
    /// Download paths of every page, for tools producing one file per page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<String>>,
}

/// Upload received from the multipart body
struct Upload {
    filename: String,
    data: Bytes,
}

/// Upload a file and convert it
///
/// Accepts multipart form data with:
/// - file: the file to convert
/// - tool: optional tool id, also accepted as a query parameter
/// - quality: optional quality, also accepted as a query parameter
///
/// Query parameters take precedence over form fields.
pub async fn upload_file(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let max_size = state.config.storage.max_file_size;
    let mut upload: Option<Upload> = None;
    let mut tool_param = params.tool;
    let mut quality_param = params.quality;

    // Parse multipart form data
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_size))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                let filename = field.file_name().map(|s| s.to_string()).unwrap_or_default();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, max_size))?;
                upload = Some(Upload { filename, data });
            }
            "tool" | "quality" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, max_size))?;
                let text = text.trim().to_string();
                let slot = if field_name == "tool" {
                    &mut tool_param
                } else {
                    &mut quality_param
                };
                if slot.is_none() && !text.is_empty() {
                    *slot = Some(text);
                }
            }
            other => {
                warn!(field = %other, "Ignoring unexpected multipart field");
            }
        }
    }

    let upload = upload.ok_or_else(|| AppError::NoFile("No file provided".to_string()))?;
    if upload.filename.trim().is_empty() {
        return Err(AppError::NoFile("No file selected".to_string()));
    }

    let extension = extension_of(&upload.filename);
    if !state.config.storage.allowed_extensions.contains(&extension) {
        return Err(AppError::UnsupportedFileType(if extension.is_empty() {
            "(none)".to_string()
        } else {
            format!(".{}", extension)
        }));
    }

    if upload.data.len() > max_size {
        return Err(AppError::FileTooLarge(describe_limit(max_size)));
    }

    let tool: ToolId = tool_param.as_deref().unwrap_or(DEFAULT_TOOL).parse()?;
    let quality = quality_param
        .as_deref()
        .map(Quality::from_param)
        .unwrap_or_default();

    if tool.is_implemented() && !tool.accepts(&extension) {
        return Err(AppError::IncompatibleInput {
            tool: tool.to_string(),
            extension,
        });
    }

    let original = state.storage.put(&upload.data, &extension).await?;
    let task_id = Uuid::new_v4();
    info!(
        task_id = %task_id,
        file = %original.name,
        tool = %tool,
        bytes = upload.data.len(),
        "Upload stored"
    );

    let output = state
        .convert_upload(task_id, original.clone(), tool, ConversionOptions { quality })
        .await?;
    let primary = match output.primary() {
        Some(primary) => primary.clone(),
        None => {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Conversion produced no output"
            )))
        }
    };

    let pages = match &output {
        ConversionOutput::Pages(files) => {
            Some(files.iter().map(|file| download_url(&file.name)).collect())
        }
        ConversionOutput::Single(_) => None,
    };

    Ok(Json(UploadResponse {
        status: "success".to_string(),
        message: "File processed successfully".to_string(),
        download_url: download_url(&primary.name),
        file_id: original
            .upload_id()
            .map(|id| id.to_string())
            .unwrap_or_default(),
        original_name: upload.filename,
        processed_name: primary.name,
        file_size: upload.data.len(),
        task_id,
        pages,
    }))
}

/// Path a client uses to fetch a stored file
fn download_url(name: &str) -> String {
    format!("/download/{}", name)
}

/// Lowercase extension of a client file name, empty if it has none
fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Human readable size limit
fn describe_limit(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Map a multipart read failure, keeping body-limit rejections as 413
fn multipart_error(e: MultipartError, max_size: usize) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::FileTooLarge(describe_limit(max_size))
    } else {
        error!("Failed to read multipart field: {}", e);
        AppError::InvalidRequest(e.body_text())
    }
}

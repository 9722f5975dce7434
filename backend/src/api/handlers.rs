//! Informational endpoints
//!
//! Root banner, health check and the tool catalog.

use crate::conversion::{catalog, ToolDescriptor};
use axum::Json;
use serde::Serialize;

/// Response for `GET /`
#[derive(Debug, Serialize)]
pub struct RootResponse {
    /// Service name
    pub message: String,
    /// Always "online"
    pub status: String,
    /// Crate version
    pub version: String,
}

/// Response for `GET /api/health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "healthy"
    pub status: String,
    /// Crate version
    pub version: String,
    /// Human readable summary
    pub message: String,
}

/// Response for `GET /tools`
#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    /// Every tool the service knows about
    pub tools: Vec<ToolDescriptor>,
}

/// Service banner
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "FlipFile API".to_string(),
        status: "online".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Liveness check
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        message: "Backend is healthy".to_string(),
    })
}

/// List the tool catalog, including tools that are not implemented yet
pub async fn list_tools() -> Json<ToolsResponse> {
    Json(ToolsResponse { tools: catalog() })
}

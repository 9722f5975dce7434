//! API module
//!
//! HTTP handlers and the route table for the file conversion API

pub mod download;
pub mod handlers;
pub mod middleware;
pub mod tasks;
pub mod upload;

use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the application with routes and middleware
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.body_limit();

    Router::new()
        .route("/", get(handlers::root))
        .route("/api/health", get(handlers::health_check))
        .route("/tools", get(handlers::list_tools))
        .route("/upload", post(upload::upload_file))
        .route("/download/:filename", get(download::download_file))
        .route("/tasks/:task_id", get(tasks::get_task))
        .layer(DefaultBodyLimit::max(body_limit))
        // Middleware (order matters - request_id should be first)
        .layer(axum::middleware::from_fn(middleware::request_id))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(CorsLayer::permissive()) // Allow CORS for development
        .with_state(state)
}

//! FlipFile Backend Library
//!
//! This library exposes modules for testing and external use.
//! The main binary is in `src/main.rs`.

pub mod api;
pub mod config;
pub mod conversion;
pub mod error;
pub mod lifecycle;
/// Application state management
///
/// Shared handles to configuration, storage, the worker pool and background jobs.
pub mod state;
pub mod storage;
pub mod worker;

pub use api::router;
pub use config::Config;
pub use state::AppState;

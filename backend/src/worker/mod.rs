//! Worker pool module
//!
//! Bounds how many conversions run at once and keeps a registry of task
//! states that handlers can query by id.

pub mod pool;
pub mod task;

pub use pool::WorkerPool;
pub use task::{ConversionTask, TaskId, TaskRegistry, TaskStatus};

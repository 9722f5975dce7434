//! Storage directory manager
//!
//! Owns the shared upload directory where original and processed files live.
//! Every file is addressed by a unique name derived from a UUID, so concurrent
//! operations never target the same path unless handed the same handle.

pub mod error;
pub mod store;

pub use error::StorageError;
pub use store::{Deletion, FileKind, Storage, StoredFile};

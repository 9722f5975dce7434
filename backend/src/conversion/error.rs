//! Conversion-specific error types
//!
//! Errors that can occur while a routine turns an input file into output files.

use super::tools::ToolId;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur during a conversion
#[derive(Error, Debug)]
pub enum ConversionError {
    /// The tool exists in the catalog but has no routine behind it
    #[error("{} is not implemented yet", .0.display_name())]
    NotImplemented(ToolId),

    /// The input could not be parsed as the expected document type
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The routine failed while producing output
    #[error("{0}")]
    Processing(String),

    /// Reading or writing the storage directory failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<std::io::Error> for ConversionError {
    fn from(e: std::io::Error) -> Self {
        ConversionError::Processing(format!("I/O error: {}", e))
    }
}

impl From<lopdf::Error> for ConversionError {
    fn from(e: lopdf::Error) -> Self {
        ConversionError::Processing(format!("PDF error: {}", e))
    }
}

impl From<zip::result::ZipError> for ConversionError {
    fn from(e: zip::result::ZipError) -> Self {
        ConversionError::Processing(format!("DOCX packaging error: {}", e))
    }
}

//! Conversion module
//!
//! Tool catalog, the dispatcher that maps a tool to its routine, and the
//! routines themselves (PDF compression/splitting/text export, image wrapping).

pub mod dispatcher;
pub mod docx;
pub mod error;
pub mod pdf;
pub mod raster;
pub mod tools;

pub use dispatcher::{ConversionOutput, Dispatcher, OutputSink};
pub use error::ConversionError;
pub use tools::{catalog, ConversionOptions, Quality, ToolDescriptor, ToolId, UnknownTool};

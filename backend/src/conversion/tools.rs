//! Tool catalog
//!
//! Static list of conversion tools exposed to clients, plus the per-request
//! options a tool may take.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a conversion tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolId {
    /// Reduce PDF file size
    Compress,
    /// PDF to DOCX
    #[serde(rename = "convert-pdf-to-word")]
    PdfToWord,
    /// Combine multiple PDFs
    Merge,
    /// One PDF per page
    Split,
    /// DOCX to PDF
    #[serde(rename = "convert-word-to-pdf")]
    WordToPdf,
    /// XLSX to PDF
    #[serde(rename = "convert-excel-to-pdf")]
    ExcelToPdf,
    /// Single image wrapped in a one-page PDF
    ImageToPdf,
    /// Rasterize PDF pages
    PdfToImage,
}

/// Catalog entry returned by `GET /tools`
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    /// Tool identifier as accepted by the upload endpoint
    pub id: &'static str,
    /// Human-readable name
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
}

impl ToolId {
    /// Every tool, in catalog order
    pub const ALL: [ToolId; 8] = [
        ToolId::Compress,
        ToolId::PdfToWord,
        ToolId::Merge,
        ToolId::Split,
        ToolId::WordToPdf,
        ToolId::ExcelToPdf,
        ToolId::ImageToPdf,
        ToolId::PdfToImage,
    ];

    /// Wire identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolId::Compress => "compress",
            ToolId::PdfToWord => "convert-pdf-to-word",
            ToolId::Merge => "merge",
            ToolId::Split => "split",
            ToolId::WordToPdf => "convert-word-to-pdf",
            ToolId::ExcelToPdf => "convert-excel-to-pdf",
            ToolId::ImageToPdf => "image-to-pdf",
            ToolId::PdfToImage => "pdf-to-image",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            ToolId::Compress => "Compress PDF",
            ToolId::PdfToWord => "PDF to Word",
            ToolId::Merge => "Merge PDF",
            ToolId::Split => "Split PDF",
            ToolId::WordToPdf => "Word to PDF",
            ToolId::ExcelToPdf => "Excel to PDF",
            ToolId::ImageToPdf => "Image to PDF",
            ToolId::PdfToImage => "PDF to Image",
        }
    }

    /// Catalog entry for this tool
    pub fn descriptor(&self) -> ToolDescriptor {
        let description = match self {
            ToolId::Compress => "Reduce PDF file size",
            ToolId::PdfToWord => "Convert PDF to editable DOCX",
            ToolId::Merge => "Combine multiple PDFs",
            ToolId::Split => "Split PDF into multiple files",
            ToolId::WordToPdf => "Convert DOCX to PDF",
            ToolId::ExcelToPdf => "Convert XLSX to PDF",
            ToolId::ImageToPdf => "Convert images to PDF",
            ToolId::PdfToImage => "Convert PDF pages to images",
        };
        ToolDescriptor {
            id: self.as_str(),
            name: self.display_name(),
            description,
        }
    }

    /// Whether a routine exists for this tool
    pub fn is_implemented(&self) -> bool {
        matches!(
            self,
            ToolId::Compress | ToolId::PdfToWord | ToolId::Split | ToolId::ImageToPdf
        )
    }

    /// Whether the tool can take an input with the given lowercase extension
    ///
    /// Unimplemented tools accept anything; they fail at dispatch instead.
    pub fn accepts(&self, extension: &str) -> bool {
        match self {
            ToolId::Compress | ToolId::PdfToWord | ToolId::Split => extension == "pdf",
            ToolId::ImageToPdf => matches!(extension, "jpg" | "jpeg" | "png"),
            _ => true,
        }
    }
}

/// Full catalog, in display order
pub fn catalog() -> Vec<ToolDescriptor> {
    ToolId::ALL.iter().map(ToolId::descriptor).collect()
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown tool identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTool(pub String);

impl fmt::Display for UnknownTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown tool: {}", self.0)
    }
}

impl std::error::Error for UnknownTool {}

impl FromStr for ToolId {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        ToolId::ALL
            .into_iter()
            .find(|tool| tool.as_str() == needle)
            .ok_or_else(|| UnknownTool(s.to_string()))
    }
}

/// Output quality for the compress tool
///
/// Lower quality means more aggressive size reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Smallest output
    Low,
    /// Balanced
    Medium,
    /// Least aggressive
    #[default]
    High,
}

impl Quality {
    /// Parse a request parameter; anything unrecognized means `High`
    pub fn from_param(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Quality::Low,
            "medium" => Quality::Medium,
            _ => Quality::High,
        }
    }
}

/// Per-request options passed to a routine
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversionOptions {
    /// Compression quality
    pub quality: Quality,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_ids_round_trip_through_from_str() {
        for tool in ToolId::ALL {
            assert_eq!(tool.as_str().parse::<ToolId>(), Ok(tool));
        }
    }

    #[test]
    fn test_unknown_tool_is_rejected() {
        let err = "teleport".parse::<ToolId>().unwrap_err();
        assert_eq!(err, UnknownTool("teleport".to_string()));
        assert_eq!(err.to_string(), "Unknown tool: teleport");
    }

    #[test]
    fn test_serde_names_match_wire_ids() {
        for tool in ToolId::ALL {
            let json = serde_json::to_string(&tool).unwrap();
            assert_eq!(json, format!("\"{}\"", tool.as_str()));
        }
    }

    #[test]
    fn test_catalog_lists_every_tool() {
        let tools = catalog();
        assert_eq!(tools.len(), 8);
        assert_eq!(tools[0].id, "compress");
        assert_eq!(tools[0].name, "Compress PDF");
        assert!(tools.iter().any(|t| t.id == "pdf-to-image"));
    }

    #[test]
    fn test_accepts_matches_input_types() {
        assert!(ToolId::Compress.accepts("pdf"));
        assert!(!ToolId::Compress.accepts("png"));
        assert!(ToolId::ImageToPdf.accepts("jpeg"));
        assert!(!ToolId::ImageToPdf.accepts("pdf"));
        assert!(ToolId::WordToPdf.accepts("pdf"));
    }

    #[test]
    fn test_quality_falls_back_to_high() {
        assert_eq!(Quality::from_param("low"), Quality::Low);
        assert_eq!(Quality::from_param("MEDIUM"), Quality::Medium);
        assert_eq!(Quality::from_param("high"), Quality::High);
        assert_eq!(Quality::from_param("ultra"), Quality::High);
        assert_eq!(Quality::from_param(""), Quality::High);
    }
}

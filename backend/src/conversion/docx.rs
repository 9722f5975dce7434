//! Minimal WordprocessingML writer
//!
//! Produces a DOCX package with a single `word/document.xml` part. Each input
//! line becomes a paragraph; pages are separated by explicit page breaks.

use super::error::ConversionError;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#;

const DOCUMENT_TAIL: &str = "<w:sectPr/></w:body></w:document>";

const PAGE_BREAK: &str = r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#;

/// Write `pages` (lines of text per page) as a DOCX file at `output`
pub fn write(pages: &[Vec<String>], output: &Path) -> Result<(), ConversionError> {
    let file = std::fs::File::create(output)?;
    let mut zip = ZipWriter::new(file);

    zip.start_file("[Content_Types].xml", part_options())?;
    zip.write_all(CONTENT_TYPES.as_bytes())?;

    zip.start_file("_rels/.rels", part_options())?;
    zip.write_all(ROOT_RELS.as_bytes())?;

    zip.start_file("word/document.xml", part_options())?;
    zip.write_all(document_xml(pages).as_bytes())?;

    let file = zip.finish()?;
    file.sync_all()?;
    Ok(())
}

fn part_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

fn document_xml(pages: &[Vec<String>]) -> String {
    let mut xml = String::from(DOCUMENT_HEAD);

    for (index, lines) in pages.iter().enumerate() {
        if index > 0 {
            xml.push_str(PAGE_BREAK);
        }
        for line in lines {
            if line.trim().is_empty() {
                xml.push_str("<w:p/>");
                continue;
            }
            xml.push_str(r#"<w:p><w:r><w:t xml:space="preserve">"#);
            xml.push_str(&escape(line));
            xml.push_str("</w:t></w:r></w:p>");
        }
    }

    xml.push_str(DOCUMENT_TAIL);
    xml
}

/// Escape markup characters and drop code points XML 1.0 can't carry
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\t' => escaped.push('\t'),
            c if c.is_control() => {}
            c => escaped.push(c),
        }
    }
    escaped
}

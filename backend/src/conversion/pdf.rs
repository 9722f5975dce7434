//! PDF routines built on lopdf
//!
//! All functions here are blocking and expected to run on the blocking pool.

use super::dispatcher::OutputSink;
use super::docx;
use super::error::ConversionError;
use super::tools::Quality;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Parse PDF bytes, classifying failures as bad input
pub fn load(bytes: &[u8]) -> Result<Document, ConversionError> {
    Document::load_mem(bytes)
        .map_err(|e| ConversionError::InvalidInput(format!("not a readable PDF: {}", e)))
}

/// Rewrite the input with recompressed streams
///
/// `Low` additionally drops the Info dictionary, unreferenced objects and
/// empty streams; `Medium` drops unreferenced objects. The output is never
/// larger than the input: if re-encoding grows the file, the input bytes are
/// kept as is.
pub fn compress(
    input: &Path,
    sink: &mut OutputSink,
    quality: Quality,
) -> Result<(), ConversionError> {
    let original = std::fs::read(input)?;
    let mut doc = load(&original)?;

    let level = match quality {
        Quality::Low => Compression::best(),
        Quality::Medium => Compression::new(6),
        Quality::High => Compression::default(),
    };

    if quality == Quality::Low {
        doc.trailer.remove(b"Info");
    }
    if quality != Quality::High {
        doc.prune_objects();
    }
    if quality == Quality::Low {
        doc.delete_zero_length_streams();
    }
    let recompressed = recompress_streams(&mut doc, level)?;
    if quality != Quality::High {
        doc.renumber_objects();
    }

    let mut buffer = Vec::with_capacity(original.len());
    doc.save_to(&mut buffer)?;

    debug!(
        quality = ?quality,
        streams = recompressed,
        input_bytes = original.len(),
        output_bytes = buffer.len(),
        "Recompressed PDF"
    );

    let bytes = if buffer.len() > original.len() {
        original
    } else {
        buffer
    };

    let output = sink.reserve("processed.pdf");
    std::fs::write(output, bytes)?;
    Ok(())
}

/// Write one single-page PDF per input page, numbered from 1
///
/// Each output holds only the objects its page reaches, so the cost per page
/// does not grow with the size of the document.
pub fn split(input: &Path, sink: &mut OutputSink) -> Result<(), ConversionError> {
    let doc = load(&std::fs::read(input)?)?;
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(ConversionError::InvalidInput("PDF has no pages".to_string()));
    }

    for (&number, &page_id) in &pages {
        let mut single = extract_page(&doc, page_id)?;

        let output = sink.reserve(&format!("processed_page_{}.pdf", number));
        let mut file = std::fs::File::create(&output)?;
        single.save_to(&mut file)?;
        file.sync_all()?;
    }

    debug!(pages = pages.len(), "Split PDF");
    Ok(())
}

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic Parent chains
const MAX_TREE_DEPTH: usize = 64;

/// Build a one-page document from `page_id` and everything it references
///
/// Other pages and page tree nodes are never copied; references to them
/// (links, annotation back-pointers) become null.
fn extract_page(doc: &Document, page_id: ObjectId) -> Result<Document, ConversionError> {
    let mut page = doc.get_dictionary(page_id)?.clone();

    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(node_id) = parent {
        if depth == MAX_TREE_DEPTH {
            warn!(page = ?page_id, "Page tree too deep, stopped inheriting attributes");
            break;
        }
        depth += 1;

        let Ok(node) = doc.get_dictionary(node_id) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key, value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    page.remove(b"Parent");

    let mut kept = HashSet::from([page_id]);
    let mut pending = Vec::new();
    for (_, value) in page.iter() {
        push_references(value, &mut pending);
    }
    while let Some(id) = pending.pop() {
        if kept.contains(&id) {
            continue;
        }
        let Ok(object) = doc.get_object(id) else {
            continue;
        };
        if is_page_tree_node(object) {
            continue;
        }
        kept.insert(id);
        push_references(object, &mut pending);
    }

    let mut single = Document::with_version(doc.version.clone());
    for &id in &kept {
        if id == page_id {
            continue;
        }
        if let Ok(object) = doc.get_object(id) {
            let mut object = object.clone();
            drop_foreign_references(&mut object, &kept);
            single.objects.insert(id, object);
        }
    }

    // Fresh ids for the new tree must not collide with copied ones
    single.max_id = doc.max_id;
    let pages_id = single.new_object_id();

    let mut page = Object::Dictionary(page);
    drop_foreign_references(&mut page, &kept);
    if let Object::Dictionary(dict) = &mut page {
        dict.set("Parent", pages_id);
    }
    single.objects.insert(page_id, page);
    single.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = single.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    single.trailer.set("Root", catalog_id);
    single.renumber_objects();

    Ok(single)
}

fn push_references(object: &Object, out: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => out.push(*id),
        Object::Array(items) => items.iter().for_each(|item| push_references(item, out)),
        Object::Dictionary(dict) => dict.iter().for_each(|(_, value)| push_references(value, out)),
        Object::Stream(stream) => stream
            .dict
            .iter()
            .for_each(|(_, value)| push_references(value, out)),
        _ => {}
    }
}

fn drop_foreign_references(object: &mut Object, kept: &HashSet<ObjectId>) {
    match object {
        Object::Reference(id) => {
            if !kept.contains(id) {
                *object = Object::Null;
            }
        }
        Object::Array(items) => items
            .iter_mut()
            .for_each(|item| drop_foreign_references(item, kept)),
        Object::Dictionary(dict) => dict
            .iter_mut()
            .for_each(|(_, value)| drop_foreign_references(value, kept)),
        Object::Stream(stream) => stream
            .dict
            .iter_mut()
            .for_each(|(_, value)| drop_foreign_references(value, kept)),
        _ => {}
    }
}

fn is_page_tree_node(object: &Object) -> bool {
    match object {
        Object::Dictionary(dict) => dict.has_type(b"Page") || dict.has_type(b"Pages"),
        _ => false,
    }
}

/// Convert the whole document to DOCX, one paragraph per text line
pub fn to_word(input: &Path, sink: &mut OutputSink) -> Result<(), ConversionError> {
    let doc = load(&std::fs::read(input)?)?;
    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();

    let pages: Vec<Vec<String>> = page_numbers
        .iter()
        .map(|&page| match doc.extract_text(&[page]) {
            Ok(text) => text.lines().map(|line| line.trim_end().to_string()).collect(),
            Err(e) => {
                // Pages with unsupported fonts come out blank rather than failing the document
                warn!(page = page, error = %e, "Failed to extract page text");
                Vec::new()
            }
        })
        .collect();

    let output = sink.reserve("processed.docx");
    docx::write(&pages, &output)
}

/// Re-encode uncompressed and plain Flate streams at `level`
///
/// Streams with other filters (images in DCT, predictors, ...) are left
/// alone. Returns how many streams were replaced.
fn recompress_streams(doc: &mut Document, level: Compression) -> Result<usize, ConversionError> {
    let mut replaced = 0;

    for object in doc.objects.values_mut() {
        let Object::Stream(stream) = object else {
            continue;
        };
        if !stream.allows_compression || is_structural(stream) {
            continue;
        }

        let raw = match stream.dict.get(b"Filter") {
            Err(_) => stream.content.clone(),
            Ok(Object::Name(name))
                if name.as_slice() == b"FlateDecode" && !stream.dict.has(b"DecodeParms") =>
            {
                match stream.decompressed_content() {
                    Ok(content) => content,
                    Err(_) => continue,
                }
            }
            Ok(_) => continue,
        };

        let mut encoder = ZlibEncoder::new(Vec::new(), level);
        encoder.write_all(&raw)?;
        let encoded = encoder.finish()?;

        if encoded.len() < stream.content.len() {
            stream.dict.set("Filter", "FlateDecode");
            stream.set_content(encoded);
            replaced += 1;
        }
    }

    Ok(replaced)
}

fn is_structural(stream: &Stream) -> bool {
    matches!(
        stream.dict.get(b"Type").and_then(Object::as_name),
        Ok(b"XRef" | b"ObjStm" | b"Metadata")
    )
}

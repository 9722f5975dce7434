//! Image to PDF
//!
//! Wraps a single JPEG or PNG in a one-page PDF. The page is sized to the
//! image at one point per pixel.

use super::dispatcher::OutputSink;
use super::error::ConversionError;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Name of the image XObject in the page resources
const IMAGE_NAME: &str = "Im0";

/// Decode the input image and write it as a one-page PDF
pub fn to_pdf(input: &Path, sink: &mut OutputSink) -> Result<(), ConversionError> {
    let bytes = std::fs::read(input)?;
    let decoded = image::load_from_memory(&bytes)
        .map_err(|e| ConversionError::InvalidInput(format!("not a readable image: {}", e)))?;

    let (width, height) = (decoded.width(), decoded.height());
    if width == 0 || height == 0 {
        return Err(ConversionError::InvalidInput("image has no pixels".to_string()));
    }

    // Alpha is dropped
    let (color_space, pixels) = if decoded.color().has_color() {
        ("DeviceRGB", decoded.to_rgb8().into_raw())
    } else {
        ("DeviceGray", decoded.to_luma8().into_raw())
    };

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&pixels)?;
    let compressed = encoder.finish()?;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        compressed,
    ));
    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! { IMAGE_NAME => image_id },
    });

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    i64::from(width).into(),
                    0.into(),
                    0.into(),
                    i64::from(height).into(),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(IMAGE_NAME.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), i64::from(width).into(), i64::from(height).into()],
        "Contents" => content_id,
        "Resources" => resources_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let output = sink.reserve("processed.pdf");
    let mut file = std::fs::File::create(&output)?;
    doc.save_to(&mut file)?;
    file.sync_all()?;

    debug!(width = width, height = height, color_space = color_space, "Wrapped image in PDF");
    Ok(())
}

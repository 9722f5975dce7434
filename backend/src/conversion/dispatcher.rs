//! Conversion dispatcher
//!
//! Resolves a tool to its routine, runs the routine on the blocking pool and
//! turns the files it wrote into a [`ConversionOutput`].

use super::error::ConversionError;
use super::tools::{ConversionOptions, ToolId};
use super::{pdf, raster};
use crate::storage::{Storage, StoredFile};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Result of a successful conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "files", rename_all = "lowercase")]
pub enum ConversionOutput {
    /// One output file
    Single(StoredFile),
    /// One output file per page, in page order
    Pages(Vec<StoredFile>),
}

impl ConversionOutput {
    /// Every output file, in order
    pub fn files(&self) -> &[StoredFile] {
        match self {
            ConversionOutput::Single(file) => std::slice::from_ref(file),
            ConversionOutput::Pages(files) => files,
        }
    }

    /// The file a client should download first
    pub fn primary(&self) -> Option<&StoredFile> {
        self.files().first()
    }
}

/// Collects the output files a routine reserves
///
/// Everything reserved here is deleted by the dispatcher if the routine
/// fails, so routines never need their own cleanup.
#[derive(Debug)]
pub struct OutputSink {
    storage: Storage,
    upload_id: Uuid,
    files: Vec<StoredFile>,
}

impl OutputSink {
    /// Create an empty sink for outputs of `upload_id`
    pub fn new(storage: Storage, upload_id: Uuid) -> Self {
        Self {
            storage,
            upload_id,
            files: Vec::new(),
        }
    }

    /// Reserve `{upload_id}_{suffix}` and return the path to write to
    pub fn reserve(&mut self, suffix: &str) -> PathBuf {
        let file = self.storage.reserve(self.upload_id, suffix);
        let path = file.path.clone();
        self.files.push(file);
        path
    }

    /// Files reserved so far
    pub fn into_files(self) -> Vec<StoredFile> {
        self.files
    }
}

/// Maps tools to routines and runs them
#[derive(Debug, Clone)]
pub struct Dispatcher {
    storage: Storage,
}

impl Dispatcher {
    /// Create a dispatcher writing outputs into `storage`
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Run `tool` on `input`
    ///
    /// # Arguments
    /// * `tool` - Resolved tool identifier
    /// * `input` - Uploaded original
    /// * `options` - Per-request options (quality)
    ///
    /// # Returns
    /// * `Ok(ConversionOutput)` - Files written under the storage root
    /// * `Err(ConversionError)` - The routine failed; nothing it wrote remains
    pub async fn dispatch(
        &self,
        tool: ToolId,
        input: &StoredFile,
        options: ConversionOptions,
    ) -> Result<ConversionOutput, ConversionError> {
        if !tool.is_implemented() {
            debug!(tool = %tool, input = %input.name, "Tool has no routine");
            return Err(ConversionError::NotImplemented(tool));
        }

        self.run_routine(tool, input, move |path, sink| match tool {
            ToolId::Compress => pdf::compress(path, sink, options.quality),
            ToolId::PdfToWord => pdf::to_word(path, sink),
            ToolId::Split => pdf::split(path, sink),
            ToolId::ImageToPdf => raster::to_pdf(path, sink),
            other => Err(ConversionError::NotImplemented(other)),
        })
        .await
    }

    /// Run `routine` on the blocking pool and collect what it wrote
    ///
    /// Outputs are removed when the routine fails or panics.
    async fn run_routine<R>(
        &self,
        tool: ToolId,
        input: &StoredFile,
        routine: R,
    ) -> Result<ConversionOutput, ConversionError>
    where
        R: FnOnce(&Path, &mut OutputSink) -> Result<(), ConversionError> + Send + 'static,
    {
        let upload_id = input.upload_id().unwrap_or_else(Uuid::new_v4);
        let mut sink = OutputSink::new(self.storage.clone(), upload_id);
        let input_path = input.path.clone();

        info!(tool = %tool, input = %input.name, "Running conversion");

        let joined = tokio::task::spawn_blocking(move || {
            let result = routine(&input_path, &mut sink);
            (sink, result)
        })
        .await;

        let (sink, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                // The sink went down with the panicking task; sweep by prefix instead
                error!(tool = %tool, error = %e, "Conversion task panicked");
                self.discard_outputs_of(upload_id).await;
                return Err(ConversionError::Processing(format!(
                    "Conversion task failed: {}",
                    e
                )));
            }
        };

        let files = sink.into_files();
        match result {
            Ok(()) if !files.is_empty() => {
                info!(tool = %tool, outputs = files.len(), "Conversion finished");
                Ok(if tool == ToolId::Split {
                    ConversionOutput::Pages(files)
                } else {
                    let mut files = files;
                    ConversionOutput::Single(files.remove(0))
                })
            }
            Ok(()) => Err(ConversionError::Processing(
                "Conversion produced no output".to_string(),
            )),
            Err(e) => {
                error!(tool = %tool, input = %input.name, error = %e, "Conversion failed");
                for file in &files {
                    self.storage.discard(file).await;
                }
                Err(e)
            }
        }
    }

    async fn discard_outputs_of(&self, upload_id: Uuid) {
        let prefix = format!("{}_processed", upload_id);
        match self.storage.list().await {
            Ok(files) => {
                for file in files.iter().filter(|f| f.name.starts_with(&prefix)) {
                    self.storage.discard(file).await;
                }
            }
            Err(e) => error!(error = %e, "Failed to list storage for cleanup"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::pdf::fixtures::text_pdf;
    use crate::conversion::raster::tests::png_bytes;
    use crate::conversion::tools::Quality;
    use crate::storage::FileKind;
    use tempfile::tempdir;

    async fn setup() -> (tempfile::TempDir, Storage, Dispatcher) {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let storage = Storage::new(temp_dir.path()).await.unwrap();
        let dispatcher = Dispatcher::new(storage.clone());
        (temp_dir, storage, dispatcher)
    }

    #[tokio::test]
    async fn test_compress_returns_single_output() {
        let (_dir, storage, dispatcher) = setup().await;
        let input = storage.put(&text_pdf(2), "pdf").await.unwrap();

        let options = ConversionOptions {
            quality: Quality::Low,
        };
        let output = dispatcher
            .dispatch(ToolId::Compress, &input, options)
            .await
            .unwrap();

        match &output {
            ConversionOutput::Single(file) => {
                assert_eq!(file.kind, FileKind::Processed);
                assert_eq!(file.upload_id(), input.upload_id());
                assert!(file.name.ends_with("_processed.pdf"));
                assert!(file.path.exists());
            }
            other => panic!("Expected single output, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_split_returns_pages() {
        let (_dir, storage, dispatcher) = setup().await;
        let input = storage.put(&text_pdf(4), "pdf").await.unwrap();

        let output = dispatcher
            .dispatch(ToolId::Split, &input, ConversionOptions::default())
            .await
            .unwrap();

        match output {
            ConversionOutput::Pages(files) => {
                assert_eq!(files.len(), 4);
                assert!(files[3].name.ends_with("_processed_page_4.pdf"));
            }
            other => panic!("Expected page outputs, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_image_to_pdf() {
        let (_dir, storage, dispatcher) = setup().await;
        let input = storage.put(&png_bytes(16, 16), "png").await.unwrap();

        let output = dispatcher
            .dispatch(ToolId::ImageToPdf, &input, ConversionOptions::default())
            .await
            .unwrap();
        assert_eq!(output.files().len(), 1);
        assert!(output.primary().unwrap().name.ends_with("_processed.pdf"));
    }

    #[tokio::test]
    async fn test_unimplemented_tools_create_nothing() {
        let (_dir, storage, dispatcher) = setup().await;
        let input = storage.put(b"PK fake docx", "docx").await.unwrap();

        for tool in [
            ToolId::WordToPdf,
            ToolId::ExcelToPdf,
            ToolId::Merge,
            ToolId::PdfToImage,
        ] {
            match dispatcher
                .dispatch(tool, &input, ConversionOptions::default())
                .await
            {
                Err(ConversionError::NotImplemented(t)) => assert_eq!(t, tool),
                other => panic!("Expected NotImplemented for {}, got: {:?}", tool, other),
            }
        }

        let files = storage.list().await.unwrap();
        assert_eq!(files.len(), 1, "Only the input should remain");
        assert_eq!(files[0].name, input.name);
    }

    #[tokio::test]
    async fn test_failed_routine_leaves_no_output() {
        let (_dir, storage, dispatcher) = setup().await;
        let input = storage.put(b"%PDF-1.4 broken", "pdf").await.unwrap();

        let result = dispatcher
            .dispatch(ToolId::Split, &input, ConversionOptions::default())
            .await;
        assert!(matches!(result, Err(ConversionError::InvalidInput(_))));

        let files = storage.list().await.unwrap();
        assert!(files.iter().all(|f| f.kind == FileKind::Original));
    }

    #[tokio::test]
    async fn test_panicking_routine_leaves_no_output() {
        let (_dir, storage, dispatcher) = setup().await;
        let input = storage.put(&text_pdf(2), "pdf").await.unwrap();
        let neighbour = storage.reserve(Uuid::new_v4(), "processed.pdf");
        std::fs::write(&neighbour.path, b"other upload").unwrap();

        let result = dispatcher
            .run_routine(ToolId::Split, &input, |_, sink| {
                for page in 1..=2 {
                    let path = sink.reserve(&format!("processed_page_{}.pdf", page));
                    std::fs::write(path, b"partial")?;
                }
                panic!("routine crashed mid-write");
            })
            .await;

        match result {
            Err(ConversionError::Processing(message)) => {
                assert!(message.contains("Conversion task failed"))
            }
            other => panic!("Expected Processing error, got: {:?}", other),
        }
        let names: Vec<String> = storage
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names.len(), 2, "left behind: {:?}", names);
        assert!(names.contains(&input.name));
        assert!(names.contains(&neighbour.name));
    }

    #[test]
    fn test_output_serializes_with_tag() {
        let output = ConversionOutput::Pages(vec![]);
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["type"], "pages");
    }
}

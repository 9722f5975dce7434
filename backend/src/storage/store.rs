//! Filesystem-backed store for uploaded and processed files

use super::error::StorageError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Marker placed between the upload id and the extension of original files
const ORIGINAL_MARKER: &str = "_original";

/// Whether a stored file is the user's upload or a conversion result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// File as uploaded by the client
    Original,
    /// Output written by a conversion routine
    Processed,
}

/// Handle to a file inside the storage root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    /// File name, unique within the storage root
    pub name: String,
    /// Absolute or root-relative path of the file
    #[serde(skip)]
    pub path: PathBuf,
    /// Original upload or processed output
    pub kind: FileKind,
    /// When the file was written (taken from mtime for files found on disk)
    pub created_at: DateTime<Utc>,
}

impl StoredFile {
    /// Upload id encoded in the file name, if the name follows the storage layout
    pub fn upload_id(&self) -> Option<Uuid> {
        self.name
            .split_once('_')
            .and_then(|(prefix, _)| Uuid::parse_str(prefix).ok())
    }

    /// Lowercase extension without the leading dot
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

/// Outcome of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    /// The file existed and was removed
    Removed,
    /// Nothing was there to remove
    AlreadyAbsent,
}

/// Storage directory manager
///
/// Cheap to clone; all clones share the same root.
#[derive(Debug, Clone)]
pub struct Storage {
    root: Arc<PathBuf>,
}

impl Storage {
    /// Open the storage root, creating it if it doesn't exist
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::io(&root, e))?;

        Ok(Self {
            root: Arc::new(root),
        })
    }

    /// Directory all files live in
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write uploaded content under a freshly generated id
    ///
    /// # Arguments
    /// * `bytes` - File content
    /// * `extension` - Suggested extension, with or without the leading dot
    ///
    /// # Returns
    /// * `Ok(StoredFile)` - Handle to the new `{uuid}_original.{ext}` file
    /// * `Err(StorageError)` - If the file could not be written
    pub async fn put(&self, bytes: &[u8], extension: &str) -> Result<StoredFile, StorageError> {
        let upload_id = Uuid::new_v4();
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        let name = if extension.is_empty() {
            format!("{}{}", upload_id, ORIGINAL_MARKER)
        } else {
            format!("{}{}.{}", upload_id, ORIGINAL_MARKER, extension)
        };
        let path = self.root.join(&name);

        if let Err(e) = write_file(&path, bytes).await {
            // Never leave a truncated upload behind
            remove_partial(&path).await;
            return Err(StorageError::io(&path, e));
        }

        debug!(file = %name, bytes = bytes.len(), "Stored upload");

        Ok(StoredFile {
            name,
            path,
            kind: FileKind::Original,
            created_at: Utc::now(),
        })
    }

    /// Handle for a processed file belonging to `upload_id`, not yet written
    ///
    /// The resulting name is `{upload_id}_{suffix}`.
    pub fn reserve(&self, upload_id: Uuid, suffix: &str) -> StoredFile {
        let name = format!("{}_{}", upload_id, suffix);
        StoredFile {
            path: self.root.join(&name),
            kind: kind_of(&name),
            name,
            created_at: Utc::now(),
        }
    }

    /// Resolve a file name to a handle
    ///
    /// # Returns
    /// * `Ok(StoredFile)` - The file exists inside the root
    /// * `Err(StorageError::InvalidName)` - The name could escape the root
    /// * `Err(StorageError::NotFound)` - No such file
    pub async fn path_for(&self, name: &str) -> Result<StoredFile, StorageError> {
        validate_name(name)?;
        let path = self.root.join(name);

        let metadata = match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(StorageError::NotFound(name.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        Ok(StoredFile {
            name: name.to_string(),
            kind: kind_of(name),
            created_at: modified_at(&metadata),
            path,
        })
    }

    /// Remove a file; removing an absent file is not an error
    pub async fn delete(&self, file: &StoredFile) -> Result<Deletion, StorageError> {
        match fs::remove_file(&file.path).await {
            Ok(()) => {
                debug!(file = %file.name, "Deleted stored file");
                Ok(Deletion::Removed)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Deletion::AlreadyAbsent),
            Err(e) => Err(StorageError::io(&file.path, e)),
        }
    }

    /// Delete a file and log, rather than return, anything other than success
    pub async fn discard(&self, file: &StoredFile) {
        if let Err(e) = self.delete(file).await {
            warn!(file = %file.name, error = %e, "Failed to delete stored file");
        }
    }

    /// Time since the file was last modified
    ///
    /// A modification time in the future counts as zero age.
    pub async fn age_of(&self, file: &StoredFile) -> Result<Duration, StorageError> {
        let metadata = fs::metadata(&file.path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::NotFound(file.name.clone())
            } else {
                StorageError::io(&file.path, e)
            }
        })?;
        let modified = metadata
            .modified()
            .map_err(|e| StorageError::io(&file.path, e))?;

        Ok(SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO))
    }

    /// Whether the file is older than the retention window
    pub async fn is_expired(
        &self,
        file: &StoredFile,
        retention: Duration,
    ) -> Result<bool, StorageError> {
        Ok(self.age_of(file).await? > retention)
    }

    /// List every regular file under the root, sorted by name
    pub async fn list(&self) -> Result<Vec<StoredFile>, StorageError> {
        let mut entries = fs::read_dir(self.root.as_path())
            .await
            .map_err(|e| StorageError::io(self.root.as_path(), e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(self.root.as_path(), e))?
        {
            let entry_path = entry.path();
            // Entries can vanish between read_dir and metadata
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io(&entry_path, e)),
            };
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = entry_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            files.push(StoredFile {
                name: name.to_string(),
                kind: kind_of(name),
                created_at: modified_at(&metadata),
                path: entry_path.clone(),
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

/// Remove a partially written file; only an absent file is silently ignored
///
/// Returns whether the path is gone afterwards.
async fn remove_partial(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove partial upload");
            false
        }
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

fn kind_of(name: &str) -> FileKind {
    if name.contains(ORIGINAL_MARKER) {
        FileKind::Original
    } else {
        FileKind::Processed
    }
}

fn modified_at(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

fn validate_name(name: &str) -> Result<(), StorageError> {
    let invalid = name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn set_mtime(path: &Path, age: Duration) {
        let file = std::fs::File::options()
            .write(true)
            .open(path)
            .expect("Failed to open file");
        file.set_modified(SystemTime::now() - age)
            .expect("Failed to set mtime");
    }

    #[tokio::test]
    async fn test_put_writes_original_under_root() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let storage = Storage::new(temp_dir.path()).await.unwrap();

        let file = storage.put(b"%PDF-1.7", ".PDF").await.unwrap();

        assert_eq!(file.kind, FileKind::Original);
        assert!(file.name.ends_with("_original.pdf"));
        assert!(file.path.starts_with(temp_dir.path()));
        assert!(file.upload_id().is_some());
        assert_eq!(file.extension().as_deref(), Some("pdf"));
        assert_eq!(std::fs::read(&file.path).unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn test_put_generates_unique_names() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let storage = Storage::new(temp_dir.path()).await.unwrap();

        let a = storage.put(b"a", "png").await.unwrap();
        let b = storage.put(b"b", "png").await.unwrap();
        assert_ne!(a.name, b.name);
        assert_ne!(a.upload_id(), b.upload_id());
    }

    #[tokio::test]
    async fn test_reserve_shares_upload_id() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let storage = Storage::new(temp_dir.path()).await.unwrap();
        let original = storage.put(b"x", "pdf").await.unwrap();
        let upload_id = original.upload_id().unwrap();

        let processed = storage.reserve(upload_id, "processed.pdf");
        assert_eq!(processed.kind, FileKind::Processed);
        assert_eq!(processed.upload_id(), Some(upload_id));
        assert_eq!(processed.name, format!("{}_processed.pdf", upload_id));
        assert!(!processed.path.exists());
    }

    #[tokio::test]
    async fn test_path_for_existing_and_missing() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let storage = Storage::new(temp_dir.path()).await.unwrap();
        let file = storage.put(b"data", "jpg").await.unwrap();

        let found = storage.path_for(&file.name).await.unwrap();
        assert_eq!(found.path, file.path);
        assert_eq!(found.kind, FileKind::Original);

        match storage.path_for("missing_processed.pdf").await {
            Err(StorageError::NotFound(_)) => {}
            other => panic!("Expected NotFound error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_path_for_rejects_traversal() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let storage = Storage::new(temp_dir.path().join("uploads")).await.unwrap();
        std::fs::write(temp_dir.path().join("secret.txt"), "secret").unwrap();

        for name in ["../secret.txt", "..", "a/b", "a\\b", ""] {
            match storage.path_for(name).await {
                Err(StorageError::InvalidName(_)) => {}
                other => panic!("Expected InvalidName for {:?}, got: {:?}", name, other),
            }
        }
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let storage = Storage::new(temp_dir.path()).await.unwrap();
        let file = storage.put(b"data", "pdf").await.unwrap();

        assert_eq!(storage.delete(&file).await.unwrap(), Deletion::Removed);
        assert_eq!(storage.delete(&file).await.unwrap(), Deletion::AlreadyAbsent);
        assert!(!file.path.exists());
    }

    #[tokio::test]
    async fn test_age_and_expiry() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let storage = Storage::new(temp_dir.path()).await.unwrap();
        let fresh = storage.put(b"fresh", "pdf").await.unwrap();
        let stale = storage.put(b"stale", "pdf").await.unwrap();
        set_mtime(&stale.path, Duration::from_secs(2 * 3600));

        let retention = Duration::from_secs(3600);
        assert!(storage.age_of(&fresh).await.unwrap() < Duration::from_secs(60));
        assert!(!storage.is_expired(&fresh, retention).await.unwrap());
        assert!(storage.age_of(&stale).await.unwrap() >= Duration::from_secs(7199));
        assert!(storage.is_expired(&stale, retention).await.unwrap());
    }

    #[tokio::test]
    async fn test_age_of_missing_file() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let storage = Storage::new(temp_dir.path()).await.unwrap();
        let ghost = storage.reserve(Uuid::new_v4(), "processed.pdf");

        match storage.age_of(&ghost).await {
            Err(StorageError::NotFound(_)) => {}
            other => panic!("Expected NotFound error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_skips_directories() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let storage = Storage::new(temp_dir.path()).await.unwrap();
        storage.put(b"one", "pdf").await.unwrap();
        storage.put(b"two", "png").await.unwrap();
        std::fs::create_dir(temp_dir.path().join("nested")).unwrap();

        let files = storage.list().await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.kind == FileKind::Original));
    }

    #[tokio::test]
    async fn test_remove_partial_ignores_only_absent_files() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let written = temp_dir.path().join("partial_original.pdf");
        std::fs::write(&written, b"trunc").unwrap();

        assert!(remove_partial(&written).await);
        assert!(!written.exists());
        assert!(remove_partial(&written).await);

        // Unlinking a directory fails with something other than NotFound
        let dir = temp_dir.path().join("not_a_file");
        std::fs::create_dir(&dir).unwrap();
        assert!(!remove_partial(&dir).await);
        assert!(dir.exists());
    }

    #[tokio::test]
    async fn test_put_into_missing_root_fails_cleanly() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path().join("uploads");
        let storage = Storage::new(&root).await.unwrap();
        std::fs::remove_dir(&root).unwrap();

        match storage.put(b"data", "pdf").await {
            Err(StorageError::Io { .. }) => {}
            other => panic!("Expected Io error, got: {:?}", other),
        }
        assert!(!root.exists());
    }
}

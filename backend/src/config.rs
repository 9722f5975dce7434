//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default maximum upload size (50 MiB)
pub const DEFAULT_MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Default cleanup interval and retention window (1 hour)
pub const DEFAULT_RETENTION_SECS: u64 = 3600;

/// Default number of conversions allowed to run at once
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Extensions accepted by the upload endpoint when none are configured
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png", "docx", "xlsx"];

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Storage and expiry configuration
    pub storage: StorageConfig,
    /// Worker pool configuration
    pub worker: WorkerConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding uploaded and processed files
    pub upload_dir: PathBuf,
    /// Largest accepted upload, in bytes
    pub max_file_size: usize,
    /// Lowercase extensions (without the dot) accepted for upload
    pub allowed_extensions: BTreeSet<String>,
    /// How often the sweeper scans the upload directory
    pub cleanup_interval: Duration,
    /// Age after which a stored file is considered expired
    pub retention: Duration,
}

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of conversions running at the same time
    pub max_concurrent: usize,
    /// Delay inserted after admission, before the conversion starts
    pub pacing: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 8000,
                host: "0.0.0.0".to_string(),
            },
            storage: StorageConfig {
                upload_dir: PathBuf::from("uploads"),
                max_file_size: DEFAULT_MAX_FILE_SIZE,
                allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                    .iter()
                    .map(|ext| ext.to_string())
                    .collect(),
                cleanup_interval: Duration::from_secs(DEFAULT_RETENTION_SECS),
                retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            },
            worker: WorkerConfig {
                max_concurrent: DEFAULT_MAX_CONCURRENT,
                pacing: Duration::ZERO,
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let allowed_extensions = env::var("ALLOWED_EXTENSIONS")
            .ok()
            .map(|list| parse_extension_list(&list))
            .filter(|set| !set.is_empty())
            .unwrap_or(defaults.storage.allowed_extensions);

        Self {
            server: ServerConfig {
                port: parse_var("PORT").unwrap_or(defaults.server.port),
                host: env::var("HOST").unwrap_or(defaults.server.host),
            },
            storage: StorageConfig {
                upload_dir: env::var_os("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.upload_dir),
                max_file_size: parse_var("MAX_FILE_SIZE_BYTES")
                    .unwrap_or(defaults.storage.max_file_size),
                allowed_extensions,
                cleanup_interval: parse_var("CLEANUP_INTERVAL_SECS")
                    .filter(|secs: &u64| *secs > 0)
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.storage.cleanup_interval),
                retention: parse_var("RETENTION_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.storage.retention),
            },
            worker: WorkerConfig {
                max_concurrent: parse_var("MAX_CONCURRENT_CONVERSIONS")
                    .filter(|n: &usize| *n > 0)
                    .unwrap_or(defaults.worker.max_concurrent),
                pacing: parse_var("CONVERSION_PACING_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.worker.pacing),
            },
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Request body limit for uploads: the file limit plus room for multipart framing
    pub fn body_limit(&self) -> usize {
        self.storage.max_file_size.saturating_add(1024 * 1024)
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.trim().parse().ok())
}

/// Parse a comma separated extension list, normalizing case and leading dots
pub fn parse_extension_list(list: &str) -> BTreeSet<String> {
    list.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

use thiserror::Error;

use crate::object_store::S3Settings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub storage: StorageConfig,
    pub transfer: TransferConfig,
    /// Persist write metadata next to local files as `<name>.metadata.json`.
    pub local_metadata_sidecar: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectBackend {
    S3,
    Directory,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: ObjectBackend,
    /// Root directory for the directory backend
    pub directory_path: String,
    /// Custom S3-compatible endpoint (MinIO, LocalStack). Unset means AWS.
    pub s3_endpoint: Option<String>,
    pub region: String,
    pub path_style: bool,
}

#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Re-read object metadata after every upload and compare digests.
    pub verify_after_write: bool,
    pub report_progress: bool,
    /// Bytes per upload chunk and per progress update
    pub chunk_size: usize,
    /// Largest payload accepted for a write, in bytes
    pub max_payload_size: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: ObjectBackend::S3,
            directory_path: "./objects".to_string(),
            s3_endpoint: None,
            region: "us-east-1".to_string(),
            path_style: false,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            verify_after_write: true,
            report_progress: true,
            chunk_size: 8 * 1024 * 1024,
            max_payload_size: 5 * 1024 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn load_from<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let flag = |name: &str, default: bool| {
            var(name)
                .map(|v| v == "true" || v == "1")
                .unwrap_or(default)
        };

        let backend = match var("OBJECT_BACKEND")
            .unwrap_or_else(|| "s3".to_string())
            .to_lowercase()
            .as_str()
        {
            "s3" => ObjectBackend::S3,
            "directory" | "dir" | "local" => ObjectBackend::Directory,
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "OBJECT_BACKEND must be 's3' or 'directory', got '{other}'"
                )))
            }
        };

        let directory_path =
            var("DIRECTORY_STORE_PATH").unwrap_or(defaults.storage.directory_path);

        let s3_endpoint = var("S3_ENDPOINT").filter(|s| !s.trim().is_empty());

        let region = var("AWS_REGION")
            .or_else(|| var("AWS_DEFAULT_REGION"))
            .unwrap_or(defaults.storage.region);

        // Custom endpoints rarely have wildcard DNS for virtual-hosted buckets.
        let path_style = flag("S3_PATH_STYLE", s3_endpoint.is_some());

        let chunk_size = var("TRANSFER_CHUNK_SIZE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.transfer.chunk_size);

        let max_payload_size = var("MAX_PAYLOAD_SIZE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.transfer.max_payload_size);

        let config = Config {
            storage: StorageConfig {
                backend,
                directory_path,
                s3_endpoint,
                region,
                path_style,
            },
            transfer: TransferConfig {
                verify_after_write: flag("VERIFY_AFTER_WRITE", true),
                report_progress: flag("REPORT_PROGRESS", true),
                chunk_size,
                max_payload_size,
            },
            local_metadata_sidecar: flag("LOCAL_METADATA_SIDECAR", false),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.transfer.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "TRANSFER_CHUNK_SIZE must be greater than zero".to_string(),
            ));
        }

        if self.storage.region.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "AWS_REGION cannot be empty".to_string(),
            ));
        }

        if let Some(endpoint) = &self.storage.s3_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "S3_ENDPOINT must start with http:// or https://, got '{endpoint}'"
                )));
            }
        }

        if self.storage.backend == ObjectBackend::Directory
            && self.storage.directory_path.trim().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "DIRECTORY_STORE_PATH cannot be empty when OBJECT_BACKEND=directory".to_string(),
            ));
        }

        if !self.transfer.verify_after_write {
            tracing::warn!(
                "VERIFY_AFTER_WRITE is disabled; corrupted uploads will not be detected"
            );
        }

        Ok(())
    }

    /// Connection settings for the S3 backend.
    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            endpoint: self.storage.s3_endpoint.clone(),
            region: self.storage.region.clone(),
            path_style: self.storage.path_style,
            chunk_size: self.transfer.chunk_size,
        }
    }
}

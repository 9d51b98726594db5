mod directory;
mod s3;
pub mod sigv4;

pub use directory::DirectoryStore;
pub use s3::{S3Settings, S3Store};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::metadata::Metadata;
use crate::progress::TransferProgress;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Access denied: {0}")]
    Unauthorized(String),
    #[error("Conflicting write: {0}")]
    Conflict(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// What a successful upload reports back.
#[derive(Debug, Clone)]
pub struct PutReceipt {
    /// MD5 hex digest of the bytes sent.
    pub digest: String,
    pub etag: Option<String>,
}

/// Stored attributes of an object, without its content.
#[derive(Debug, Clone, Default)]
pub struct ObjectHead {
    pub size: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub metadata: Metadata,
}

/// Abstraction over bucket/key object storage backends.
/// Every metadata entry handed to `put` must come back from `head`. Keys
/// arrive lowercased from `metadata::merge`; S3 folds them regardless.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(
        &self,
        bucket: &str,
        key: &str,
        progress: Arc<dyn TransferProgress>,
    ) -> Result<Bytes, ObjectStoreError>;

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        metadata: &Metadata,
        progress: Arc<dyn TransferProgress>,
    ) -> Result<PutReceipt, ObjectStoreError>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError>;

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead, ObjectStoreError>;
}

/// Content type recorded for an upload, guessed from the key's extension.
pub(crate) fn content_type_for(key: &str) -> String {
    mime_guess::from_path(key)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Split `data` into slices of at most `chunk_size` bytes without copying.
/// An empty payload yields one empty chunk so progress still reports once.
pub(crate) fn chunks(data: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    if data.is_empty() {
        return vec![Bytes::new()];
    }
    let chunk_size = chunk_size.max(1);
    (0..data.len())
        .step_by(chunk_size)
        .map(|start| data.slice(start..(start + chunk_size).min(data.len())))
        .collect()
}

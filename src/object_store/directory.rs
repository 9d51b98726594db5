use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use super::{chunks, content_type_for, ObjectHead, ObjectStore, ObjectStoreError, PutReceipt};
use crate::checksum;
use crate::local::temp_path;
use crate::metadata::Metadata;
use crate::progress::TransferProgress;

const METADATA_DIR: &str = ".metadata";
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Object store laid out on the local filesystem, for development and testing.
/// Objects live at `<root>/<bucket>/<key>`; their metadata at
/// `<root>/.metadata/<bucket>/<key>.json`.
pub struct DirectoryStore {
    base_path: PathBuf,
    chunk_size: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredAttributes {
    content_type: Option<String>,
    etag: Option<String>,
    metadata: Metadata,
}

impl DirectoryStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Size of the pieces written and read between progress updates.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, ObjectStoreError> {
        Ok(self.base_path.join(bucket_segment(bucket)?).join(key_path(key)?))
    }

    fn attributes_path(&self, bucket: &str, key: &str) -> Result<PathBuf, ObjectStoreError> {
        let mut path = self
            .base_path
            .join(METADATA_DIR)
            .join(bucket_segment(bucket)?)
            .join(key_path(key)?)
            .into_os_string();
        path.push(".json");
        Ok(PathBuf::from(path))
    }

    async fn read_attributes(&self, path: &Path) -> Result<Option<StoredAttributes>, ObjectStoreError> {
        match tokio::fs::read(path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| ObjectStoreError::Backend(format!("Corrupt metadata file: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ObjectStore for DirectoryStore {
    async fn get(
        &self,
        bucket: &str,
        key: &str,
        progress: Arc<dyn TransferProgress>,
    ) -> Result<Bytes, ObjectStoreError> {
        let path = self.object_path(bucket, key)?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ObjectStoreError::NotFound(format!("{bucket}/{key}")));
            }
            Err(e) => return Err(e.into()),
        };

        let mut data = BytesMut::new();
        let mut stream = ReaderStream::with_capacity(file, self.chunk_size);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            progress.advance(chunk.len() as u64);
            data.extend_from_slice(&chunk);
        }
        if data.is_empty() {
            progress.advance(0);
        }
        Ok(data.freeze())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        metadata: &Metadata,
        progress: Arc<dyn TransferProgress>,
    ) -> Result<PutReceipt, ObjectStoreError> {
        let path = self.object_path(bucket, key)?;
        let attributes_path = self.attributes_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if let Some(parent) = attributes_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let digest = checksum::digest(&data);
        let attributes = StoredAttributes {
            content_type: Some(content_type_for(key)),
            etag: Some(digest.clone()),
            metadata: metadata.clone(),
        };
        let raw = serde_json::to_vec_pretty(&attributes)
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        // Both files are staged first so a failed write leaves the previous
        // object and its attributes untouched.
        let object_tmp = temp_path(&path);
        let attributes_tmp = temp_path(&attributes_path);
        let staged = async {
            {
                let mut file = tokio::fs::File::create(&object_tmp).await?;
                for chunk in chunks(&data, self.chunk_size) {
                    file.write_all(&chunk).await?;
                    progress.advance(chunk.len() as u64);
                }
                file.flush().await?;
            }
            tokio::fs::write(&attributes_tmp, &raw).await?;
            tokio::fs::rename(&object_tmp, &path).await?;
            tokio::fs::rename(&attributes_tmp, &attributes_path).await?;
            Ok::<_, std::io::Error>(())
        }
        .await;
        if let Err(e) = staged {
            let _ = tokio::fs::remove_file(&object_tmp).await;
            let _ = tokio::fs::remove_file(&attributes_tmp).await;
            return Err(e.into());
        }

        Ok(PutReceipt {
            etag: Some(digest.clone()),
            digest,
        })
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ObjectStoreError::NotFound(format!("{bucket}/{key}")));
            }
            Err(e) => return Err(e.into()),
        }

        // Orphaned attributes are harmless; a missing file is fine.
        let attributes_path = self.attributes_path(bucket, key)?;
        if let Err(e) = tokio::fs::remove_file(&attributes_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(bucket, key, error = %e, "Failed to remove object metadata");
            }
        }
        Ok(())
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead, ObjectStoreError> {
        let path = self.object_path(bucket, key)?;
        let stat = match tokio::fs::metadata(&path).await {
            Ok(stat) if stat.is_file() => stat,
            Ok(_) => return Err(ObjectStoreError::NotFound(format!("{bucket}/{key}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ObjectStoreError::NotFound(format!("{bucket}/{key}")));
            }
            Err(e) => return Err(e.into()),
        };

        let attributes = self
            .read_attributes(&self.attributes_path(bucket, key)?)
            .await?;
        let (content_type, etag, metadata) = match attributes {
            Some(a) => (a.content_type, a.etag, a.metadata),
            None => (Some(content_type_for(key)), None, Metadata::new()),
        };

        Ok(ObjectHead {
            size: stat.len(),
            content_type,
            etag,
            metadata,
        })
    }
}

fn bucket_segment(bucket: &str) -> Result<&str, ObjectStoreError> {
    if bucket.is_empty() || bucket.starts_with('.') || bucket.contains(['/', '\\']) {
        return Err(ObjectStoreError::InvalidRequest(format!(
            "invalid bucket name '{bucket}'"
        )));
    }
    Ok(bucket)
}

/// Keys map onto nested directories; traversal segments are refused.
fn key_path(key: &str) -> Result<PathBuf, ObjectStoreError> {
    let mut path = PathBuf::new();
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            return Err(ObjectStoreError::InvalidRequest(format!(
                "invalid object key '{key}'"
            )));
        }
        path.push(segment);
    }
    Ok(path)
}

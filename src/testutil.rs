//! Shared test helpers for file-manager tests.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::manager::{FileManager, ManagerOptions};
use crate::metadata::{Metadata, DIGEST_KEY};
use crate::object_store::{DirectoryStore, ObjectHead, ObjectStore, ObjectStoreError, PutReceipt};
use crate::progress::TransferProgress;

fn directory_store(temp_dir: &tempfile::TempDir) -> DirectoryStore {
    DirectoryStore::new(temp_dir.path().join("objects"))
        .expect("Failed to create test object store")
        .with_chunk_size(4)
}

/// A FileManager over a temporary directory-backed object store.
pub fn test_manager(temp_dir: &tempfile::TempDir) -> FileManager {
    FileManager::new(Arc::new(directory_store(temp_dir))).with_options(ManagerOptions {
        report_progress: false,
        ..ManagerOptions::default()
    })
}

/// A local path inside the temp dir, outside the object store root.
pub fn local_path(temp_dir: &tempfile::TempDir, name: &str) -> String {
    temp_dir.path().join(name).to_string_lossy().into_owned()
}

/// Stores objects normally but reports a wrong digest from `head`, the way a
/// store that corrupted the upload would.
pub struct TamperedHead(DirectoryStore);

impl TamperedHead {
    pub fn new(temp_dir: &tempfile::TempDir) -> Self {
        Self(directory_store(temp_dir))
    }
}

#[async_trait]
impl ObjectStore for TamperedHead {
    async fn get(
        &self,
        bucket: &str,
        key: &str,
        progress: Arc<dyn TransferProgress>,
    ) -> Result<Bytes, ObjectStoreError> {
        self.0.get(bucket, key, progress).await
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        metadata: &Metadata,
        progress: Arc<dyn TransferProgress>,
    ) -> Result<PutReceipt, ObjectStoreError> {
        self.0.put(bucket, key, data, metadata, progress).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
        self.0.delete(bucket, key).await
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead, ObjectStoreError> {
        let mut head = self.0.head(bucket, key).await?;
        head.metadata.insert(
            DIGEST_KEY.to_string(),
            "00000000000000000000000000000000".to_string(),
        );
        Ok(head)
    }
}

/// Every upload fails with a transport error.
pub struct FailingPut(DirectoryStore);

impl FailingPut {
    pub fn new(temp_dir: &tempfile::TempDir) -> Self {
        Self(directory_store(temp_dir))
    }
}

#[async_trait]
impl ObjectStore for FailingPut {
    async fn get(
        &self,
        bucket: &str,
        key: &str,
        progress: Arc<dyn TransferProgress>,
    ) -> Result<Bytes, ObjectStoreError> {
        self.0.get(bucket, key, progress).await
    }

    async fn put(
        &self,
        _bucket: &str,
        _key: &str,
        _data: Bytes,
        _metadata: &Metadata,
        _progress: Arc<dyn TransferProgress>,
    ) -> Result<PutReceipt, ObjectStoreError> {
        Err(ObjectStoreError::Backend(
            "connection reset by peer".to_string(),
        ))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
        self.0.delete(bucket, key).await
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead, ObjectStoreError> {
        self.0.head(bucket, key).await
    }
}

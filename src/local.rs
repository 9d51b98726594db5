use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;

use crate::metadata::Metadata;
use crate::payload::Payload;

const SIDECAR_SUFFIX: &str = ".metadata.json";

#[derive(Debug, Error)]
pub enum LocalStoreError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Corrupt metadata sidecar {path}: {source}")]
    Sidecar {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl LocalStoreError {
    fn from_io(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::NotFound => LocalStoreError::NotFound(path.to_path_buf()),
            ErrorKind::PermissionDenied => LocalStoreError::PermissionDenied(path.to_path_buf()),
            _ => LocalStoreError::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

/// Size and (if persisted) metadata of a local file.
#[derive(Debug, Clone)]
pub struct LocalStat {
    pub size: u64,
    pub metadata: Option<Metadata>,
}

/// Whole-file access to paths on the local filesystem.
///
/// Writes go to a temporary file in the target's directory and are renamed
/// into place, so a failed write never leaves a truncated target behind.
#[derive(Debug, Clone, Default)]
pub struct LocalFiles {
    sidecar: bool,
}

impl LocalFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist write metadata next to each file as `<name>.metadata.json`.
    pub fn with_metadata_sidecar(mut self, enabled: bool) -> Self {
        self.sidecar = enabled;
        self
    }

    pub async fn read(&self, path: &Path) -> Result<Bytes, LocalStoreError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| LocalStoreError::from_io(path, e))?;
        Ok(Bytes::from(data))
    }

    pub async fn write(
        &self,
        path: &Path,
        payload: &Payload,
        metadata: &Metadata,
    ) -> Result<(), LocalStoreError> {
        // Text is written as its UTF-8 bytes with no newline translation, so
        // both modes store exactly the checksummed bytes.
        let data = payload.to_bytes();
        tracing::debug!(path = %path.display(), mode = payload.mode().as_str(), "Writing local file");

        write_atomic(path, &data).await?;

        if self.sidecar {
            let raw = serde_json::to_vec_pretty(metadata).map_err(|e| LocalStoreError::Sidecar {
                path: sidecar_path(path),
                source: e,
            })?;
            write_atomic(&sidecar_path(path), &raw).await?;
        }
        Ok(())
    }

    pub async fn delete(&self, path: &Path) -> Result<(), LocalStoreError> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| LocalStoreError::from_io(path, e))?;

        let sidecar = sidecar_path(path);
        if let Err(e) = tokio::fs::remove_file(&sidecar).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %sidecar.display(), error = %e, "Failed to remove metadata sidecar");
            }
        }
        Ok(())
    }

    pub async fn stat(&self, path: &Path) -> Result<LocalStat, LocalStoreError> {
        let stat = tokio::fs::metadata(path)
            .await
            .map_err(|e| LocalStoreError::from_io(path, e))?;
        if !stat.is_file() {
            return Err(LocalStoreError::NotFound(path.to_path_buf()));
        }

        let sidecar = sidecar_path(path);
        let metadata = match tokio::fs::read(&sidecar).await {
            Ok(raw) => Some(
                serde_json::from_slice(&raw)
                    .map_err(|e| LocalStoreError::Sidecar { path: sidecar, source: e })?,
            ),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(LocalStoreError::from_io(&sidecar, e)),
        };

        Ok(LocalStat {
            size: stat.len(),
            metadata,
        })
    }
}

pub(crate) fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), LocalStoreError> {
    let tmp = temp_path(path);
    if let Err(e) = tokio::fs::write(&tmp, data).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_error(path, e));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_error(path, e));
    }
    Ok(())
}

/// A missing parent directory is an I/O failure for writes, not a 404.
fn write_error(path: &Path, err: std::io::Error) -> LocalStoreError {
    match err.kind() {
        ErrorKind::PermissionDenied => LocalStoreError::PermissionDenied(path.to_path_buf()),
        _ => LocalStoreError::Io {
            path: path.to_path_buf(),
            source: err,
        },
    }
}

/// Hidden sibling of `path` to stage a write before renaming it into place.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_name = format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple());
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

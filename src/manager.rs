use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::checksum;
use crate::classify::{Classifier, HeuristicClassifier};
use crate::config::{Config, TransferConfig};
use crate::envelope::{DebugTrace, ResultEnvelope};
use crate::error::TransferError;
use crate::local::LocalFiles;
use crate::location::Location;
use crate::metadata::{self, Computed, Metadata};
use crate::object_store::{content_type_for, ObjectStore};
use crate::payload::Payload;
use crate::progress::{NoProgress, ProgressReporter, TransferProgress};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Re-read object metadata after each upload and compare digests.
    pub verify_after_write: bool,
    pub report_progress: bool,
    pub max_payload_size: u64,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        ManagerOptions::from(&TransferConfig::default())
    }
}

impl From<&TransferConfig> for ManagerOptions {
    fn from(config: &TransferConfig) -> Self {
        Self {
            verify_after_write: config.verify_after_write,
            report_progress: config.report_progress,
            max_payload_size: config.max_payload_size,
        }
    }
}

/// Per-call switches.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Attach the debug trace to successful and 4xx results too.
    pub debug: bool,
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    pub fn debug() -> Self {
        Self {
            debug: true,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Content and integrity inputs for a write.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub payload: Payload,
    /// Expected MD5 hex digest of the payload. Checked before anything is written.
    pub md5: Option<String>,
    pub metadata: HashMap<String, Value>,
}

impl WriteRequest {
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self {
            payload: payload.into(),
            md5: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_md5(mut self, md5: impl Into<String>) -> Self {
        self.md5 = Some(md5.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Get,
    Post,
    Delete,
    Head,
}

impl FromStr for Action {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "get" => Ok(Action::Get),
            "post" => Ok(Action::Post),
            "delete" => Ok(Action::Delete),
            "head" => Ok(Action::Head),
            other => Err(TransferError::Validation(format!("unknown action '{other}'"))),
        }
    }
}

/// Content read from either backend.
struct Fetched {
    data: Bytes,
    binary: bool,
    digest: String,
    metadata: Option<Metadata>,
    content_type: Option<String>,
}

/// Outcome of a successful write.
struct Written {
    digest: String,
    metadata: Metadata,
    size: u64,
    /// The stored digest was already checked against `digest`.
    verified: bool,
}

// ============================================================================
// FileManager
// ============================================================================

/// Reads, writes and deletes files on the local filesystem or in an object
/// store, addressed by a single path string (`s3://bucket/key` or a local path).
///
/// Every operation returns a [`ResultEnvelope`]; failures never escape as
/// errors.
pub struct FileManager {
    objects: Arc<dyn ObjectStore>,
    local: LocalFiles,
    classifier: Arc<dyn Classifier>,
    options: ManagerOptions,
}

impl FileManager {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            objects,
            local: LocalFiles::new(),
            classifier: Arc::new(HeuristicClassifier),
            options: ManagerOptions::default(),
        }
    }

    pub fn from_config(config: &Config, objects: Arc<dyn ObjectStore>) -> Self {
        Self::new(objects)
            .with_local(LocalFiles::new().with_metadata_sidecar(config.local_metadata_sidecar))
            .with_options(ManagerOptions::from(&config.transfer))
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_local(mut self, local: LocalFiles) -> Self {
        self.local = local;
        self
    }

    pub fn with_options(mut self, options: ManagerOptions) -> Self {
        self.options = options;
        self
    }

    /// Dispatch on an action name: `get`, `post`, `delete` or `head`.
    pub async fn manage(
        &self,
        action: &str,
        path: &str,
        write: Option<WriteRequest>,
        options: &CallOptions,
    ) -> ResultEnvelope {
        let action = match action.parse::<Action>() {
            Ok(action) => action,
            Err(e) => {
                let mut trace = DebugTrace::new("process", path);
                trace.set("action", action);
                return self.finish("process", path, Err(e), trace, options);
            }
        };

        match (action, write) {
            (Action::Get, _) => self.get(path, options).await,
            (Action::Post, Some(request)) => self.post(path, request, options).await,
            (Action::Post, None) => {
                let err = TransferError::Validation("post requires content".to_string());
                self.finish("write", path, Err(err), DebugTrace::new("write", path), options)
            }
            (Action::Delete, _) => self.delete(path, options).await,
            (Action::Head, _) => self.head(path, options).await,
        }
    }

    pub async fn get(&self, path: &str, options: &CallOptions) -> ResultEnvelope {
        let mut trace = DebugTrace::new("read", path);
        let result = cancellable(options, async {
            let location = parse(path)?;
            let fetched = self.fetch(&location, &mut trace).await?;
            let envelope = ResultEnvelope::success("File read successfully.")
                .with_content(fetched.data, fetched.binary)
                .with_digest(fetched.digest)
                .with_content_type(fetched.content_type);
            Ok::<_, TransferError>(match fetched.metadata {
                Some(metadata) => envelope.with_metadata(metadata),
                None => envelope,
            })
        })
        .await;
        self.finish("read", path, result, trace, options)
    }

    pub async fn post(
        &self,
        path: &str,
        request: WriteRequest,
        options: &CallOptions,
    ) -> ResultEnvelope {
        let mut trace = DebugTrace::new("write", path);
        let result = cancellable(options, async {
            let location = parse(path)?;
            let written = self.store(&location, &request, &mut trace).await?;
            Ok::<_, TransferError>(ResultEnvelope::success("File written successfully.")
                .with_digest(written.digest)
                .with_metadata(written.metadata)
                .with_size(written.size))
        })
        .await;
        self.finish("write", path, result, trace, options)
    }

    pub async fn delete(&self, path: &str, options: &CallOptions) -> ResultEnvelope {
        let mut trace = DebugTrace::new("delete", path);
        let result = cancellable(options, async {
            let location = parse(path)?;
            self.remove(&location, &mut trace).await?;
            Ok::<_, TransferError>(ResultEnvelope::success("File deleted successfully."))
        })
        .await;
        self.finish("delete", path, result, trace, options)
    }

    /// Size, content type and stored metadata without transferring content.
    pub async fn head(&self, path: &str, options: &CallOptions) -> ResultEnvelope {
        let mut trace = DebugTrace::new("inspect", path);
        let result = cancellable(options, async {
            let location = parse(path)?;
            let (size, content_type, stored) = match &location {
                Location::Local(p) => {
                    trace.set("backend", "local");
                    let stat = self.local.stat(p).await?;
                    (stat.size, Some(content_type_for(path)), stat.metadata)
                }
                Location::Object { bucket, key } => {
                    trace.set("backend", "object");
                    let head = self.objects.head(bucket, key).await?;
                    (head.size, head.content_type, Some(head.metadata))
                }
            };

            let mut envelope = ResultEnvelope::success("File metadata retrieved successfully.")
                .with_size(size)
                .with_content_type(content_type);
            if let Some(stored) = stored {
                if let Some(digest) = metadata::stored_digest(&stored) {
                    envelope = envelope.with_digest(digest.to_string());
                }
                envelope = envelope.with_metadata(stored);
            }
            Ok::<_, TransferError>(envelope)
        })
        .await;
        self.finish("inspect", path, result, trace, options)
    }

    /// Copy `source` to `destination`, confirm the stored copy independently,
    /// then delete the source. The source is untouched if any earlier step
    /// fails.
    pub async fn move_file(
        &self,
        source: &str,
        destination: &str,
        options: &CallOptions,
    ) -> ResultEnvelope {
        let mut trace = DebugTrace::new("move", source);
        trace.set("destination", destination);
        let result = cancellable(options, async {
            let from = parse(source)?;
            let to = parse(destination)?;
            if same_location(&from, &to).await {
                return Err(TransferError::Validation(
                    "source and destination are the same".to_string(),
                ));
            }

            let fetched = self.fetch(&from, &mut trace).await?;
            let carried = fetched
                .metadata
                .as_ref()
                .map(metadata::caller_entries)
                .unwrap_or_default();
            let request = WriteRequest {
                payload: Payload::from_stored(fetched.data, fetched.binary),
                md5: Some(fetched.digest.clone()),
                metadata: carried,
            };

            let written = self.store(&to, &request, &mut trace).await?;
            if !written.verified {
                self.confirm(&to, &written.digest).await?;
            }
            self.remove(&from, &mut trace).await?;

            Ok::<_, TransferError>(ResultEnvelope::success("File moved successfully.")
                .with_digest(written.digest)
                .with_metadata(written.metadata)
                .with_size(written.size))
        })
        .await;
        self.finish("move", source, result, trace, options)
    }

    // ------------------------------------------------------------------------
    // Backend dispatch
    // ------------------------------------------------------------------------

    async fn fetch(
        &self,
        location: &Location,
        trace: &mut DebugTrace,
    ) -> Result<Fetched, TransferError> {
        match location {
            Location::Local(path) => {
                trace.set("backend", "local");
                let data = self.local.read(path).await?;
                let binary = self.classifier.classify(&data).is_binary;
                let stored = self.local.stat(path).await?.metadata;
                trace.set("binary", binary);
                trace.set("size", data.len());
                Ok(Fetched {
                    digest: checksum::digest(&data),
                    binary,
                    data,
                    metadata: stored,
                    content_type: None,
                })
            }
            Location::Object { bucket, key } => {
                trace.set("backend", "object");
                // Sized up front so progress can report a percentage.
                let head = self.objects.head(bucket, key).await?;
                trace.set("size", head.size);
                let progress = self.progress(format!("download {location}"), head.size);
                let data = self.objects.get(bucket, key, progress).await?;
                Ok(Fetched {
                    digest: checksum::digest(&data),
                    binary: true,
                    data,
                    metadata: Some(head.metadata),
                    content_type: head.content_type,
                })
            }
        }
    }

    async fn store(
        &self,
        location: &Location,
        request: &WriteRequest,
        trace: &mut DebugTrace,
    ) -> Result<Written, TransferError> {
        let data = request.payload.to_bytes();
        let size = data.len() as u64;
        trace.set("mode", request.payload.mode().as_str());
        trace.set("size", size);

        if size > self.options.max_payload_size {
            return Err(TransferError::Validation(format!(
                "payload of {size} bytes exceeds the maximum of {} bytes",
                self.options.max_payload_size
            )));
        }

        let digest = match &request.md5 {
            Some(expected) => {
                let check = checksum::verify(&data, expected);
                if !check.matches {
                    return Err(TransferError::DigestMismatch {
                        expected: expected.clone(),
                        computed: check.computed,
                    });
                }
                check.computed
            }
            None => checksum::digest(&data),
        };
        trace.set("digest", digest.as_str());

        let metadata = metadata::merge(
            &request.metadata,
            &Computed {
                digest: digest.clone(),
                size,
            },
        )?;

        let mut verified = false;
        match location {
            Location::Local(path) => {
                trace.set("backend", "local");
                self.local.write(path, &request.payload, &metadata).await?;
            }
            Location::Object { bucket, key } => {
                trace.set("backend", "object");
                let progress = self.progress(format!("upload {location}"), size);
                let receipt = self
                    .objects
                    .put(bucket, key, data, &metadata, progress)
                    .await?;
                if let Some(etag) = receipt.etag {
                    trace.set("etag", etag);
                }
                if self.options.verify_after_write {
                    self.confirm(location, &digest).await?;
                    verified = true;
                }
            }
        }
        trace.set("verified", verified);

        Ok(Written {
            digest,
            metadata,
            size,
            verified,
        })
    }

    async fn remove(
        &self,
        location: &Location,
        trace: &mut DebugTrace,
    ) -> Result<(), TransferError> {
        match location {
            Location::Local(path) => {
                trace.set("backend", "local");
                self.local.delete(path).await?;
            }
            Location::Object { bucket, key } => {
                trace.set("backend", "object");
                self.objects.delete(bucket, key).await?;
            }
        }
        Ok(())
    }

    /// Check what is actually stored against the digest that was written.
    /// Objects are compared through their stored metadata, local files by
    /// re-reading them. A mismatch leaves the stored copy in place.
    async fn confirm(&self, location: &Location, digest: &str) -> Result<(), TransferError> {
        let stored = match location {
            Location::Local(path) => Some(checksum::digest(&self.local.read(path).await?)),
            Location::Object { bucket, key } => {
                let head = self.objects.head(bucket, key).await?;
                metadata::stored_digest(&head.metadata).map(str::to_string)
            }
        };

        match stored {
            Some(stored) if stored.eq_ignore_ascii_case(digest) => Ok(()),
            stored => {
                warn!(
                    location = %location,
                    stored = stored.as_deref().unwrap_or("<missing>"),
                    written = digest,
                    "Stored digest does not match; leaving the stored copy in place"
                );
                Err(TransferError::Integrity {
                    stored,
                    computed: digest.to_string(),
                })
            }
        }
    }

    fn progress(&self, label: String, total_bytes: u64) -> Arc<dyn TransferProgress> {
        if self.options.report_progress {
            Arc::new(ProgressReporter::new(label, total_bytes))
        } else {
            Arc::new(NoProgress)
        }
    }

    fn finish(
        &self,
        operation: &str,
        path: &str,
        result: Result<ResultEnvelope, TransferError>,
        trace: DebugTrace,
        options: &CallOptions,
    ) -> ResultEnvelope {
        match result {
            Ok(envelope) => {
                debug!(operation, path, status = envelope.status, "File operation succeeded");
                envelope.attach_debug(trace, options.debug)
            }
            Err(e) => {
                warn!(
                    operation,
                    path,
                    status = e.status(),
                    category = e.category(),
                    error = %e,
                    "File operation failed"
                );
                ResultEnvelope::failure(&e, operation, trace, options.debug)
            }
        }
    }
}

fn parse(path: &str) -> Result<Location, TransferError> {
    let location = Location::parse(path)?;
    location.require_key()?;
    Ok(location)
}

/// Whether two locations name the same stored file. Local paths are
/// compared after resolving `..` and symlinks, so an alias of the source
/// is not mistaken for a separate destination.
async fn same_location(from: &Location, to: &Location) -> bool {
    match (from, to) {
        (Location::Local(source), Location::Local(destination)) => {
            match (resolve(source).await, resolve(destination).await) {
                (Some(source), Some(destination)) => source == destination,
                _ => source == destination,
            }
        }
        _ => from == to,
    }
}

/// Canonical form of `path`. A path that does not exist yet resolves
/// through its parent directory.
async fn resolve(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = tokio::fs::canonicalize(path).await {
        return Some(resolved);
    }
    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let parent = tokio::fs::canonicalize(parent).await.ok()?;
    Some(parent.join(name))
}

/// Run `operation`, abandoning it if the call's cancellation token fires.
async fn cancellable<T, F>(options: &CallOptions, operation: F) -> Result<T, TransferError>
where
    F: Future<Output = Result<T, TransferError>>,
{
    match &options.cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(TransferError::Cancelled),
            result = operation => result,
        },
        None => operation.await,
    }
}

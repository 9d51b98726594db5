use std::collections::BTreeMap;

use base64::Engine;
use bytes::Bytes;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::TransferError;
use crate::metadata::Metadata;

// ============================================================================
// Debug details
// ============================================================================

/// Diagnostic fields collected while an operation runs. Only attached to the
/// envelope when the caller asked for debug output or the operation failed
/// with a server-side status.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct DebugTrace(BTreeMap<String, Value>);

impl DebugTrace {
    pub fn new(operation: &str, location: &str) -> Self {
        let mut trace = Self::default();
        trace.set("operation", operation);
        trace.set("location", location);
        trace
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

// ============================================================================
// Result envelope
// ============================================================================

/// Uniform result of every file operation.
#[derive(Debug, Clone, Serialize)]
pub struct ResultEnvelope {
    pub status: u16,
    pub message: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "content_as_base64"
    )]
    pub content: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugTrace>,
}

impl ResultEnvelope {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: 200,
            message: message.into(),
            content: None,
            binary: None,
            digest: None,
            metadata: None,
            size: None,
            content_type: None,
            debug: None,
        }
    }

    /// Envelope for a failed operation. Server-side failures always carry the
    /// debug trace, with the underlying error text recorded in it.
    pub fn failure(
        error: &TransferError,
        operation: &str,
        mut trace: DebugTrace,
        debug: bool,
    ) -> Self {
        trace.set("category", error.category());
        trace.set("error", error.to_string());

        let mut envelope = Self::success(error.public_message(operation));
        envelope.status = error.status();
        envelope.digest = error.computed_digest().map(str::to_string);
        envelope.attach_debug(trace, debug)
    }

    pub fn with_content(mut self, content: Bytes, binary: bool) -> Self {
        self.size = Some(content.len() as u64);
        self.content = Some(content);
        self.binary = Some(binary);
        self
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn attach_debug(mut self, trace: DebugTrace, debug: bool) -> Self {
        if debug || self.status >= 500 {
            self.debug = Some(trace);
        }
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Content decoded as UTF-8, if present and valid.
    pub fn text(&self) -> Option<&str> {
        self.content
            .as_deref()
            .and_then(|b| std::str::from_utf8(b).ok())
    }
}

fn content_as_base64<S: Serializer>(content: &Option<Bytes>, s: S) -> Result<S::Ok, S::Error> {
    match content {
        Some(bytes) => s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes)),
        None => s.serialize_none(),
    }
}

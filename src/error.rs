use thiserror::Error;

use crate::local::LocalStoreError;
use crate::location::LocationError;
use crate::metadata::MetadataError;
use crate::object_store::ObjectStoreError;

/// Failure categories every operation is reduced to.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    /// Caller's digest did not match the payload; nothing was written.
    #[error("provided digest {expected} does not match computed digest {computed}")]
    DigestMismatch { expected: String, computed: String },
    /// The store refused the write because of a conflicting state.
    #[error("{0}")]
    Conflict(String),
    /// The write happened but the stored digest disagrees with what was sent.
    #[error("stored digest {} does not match written digest {computed}", stored.as_deref().unwrap_or("<missing>"))]
    Integrity {
        stored: Option<String>,
        computed: String,
    },
    #[error("operation cancelled")]
    Cancelled,
    #[error("{0}")]
    Io(String),
    #[error("{0}")]
    Transport(String),
}

impl TransferError {
    /// HTTP-style status code reported in the result envelope.
    pub fn status(&self) -> u16 {
        match self {
            TransferError::Validation(_) => 400,
            TransferError::Unauthorized(_) => 403,
            TransferError::NotFound(_) => 404,
            TransferError::DigestMismatch { .. } | TransferError::Conflict(_) => 409,
            TransferError::Integrity { .. } => 502,
            TransferError::Cancelled | TransferError::Io(_) | TransferError::Transport(_) => 500,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            TransferError::Validation(_) => "validation",
            TransferError::NotFound(_) => "not_found",
            TransferError::Unauthorized(_) => "unauthorized",
            TransferError::DigestMismatch { .. } | TransferError::Conflict(_) => "conflict",
            TransferError::Integrity { .. } => "integrity",
            TransferError::Cancelled => "cancelled",
            TransferError::Io(_) => "io",
            TransferError::Transport(_) => "transport",
        }
    }

    /// Message safe to show without the debug flag. Server-side failures keep
    /// their underlying text out of it.
    pub fn public_message(&self, operation: &str) -> String {
        match self {
            TransferError::Integrity { .. } => format!(
                "Failed to {operation} file: stored content failed integrity verification."
            ),
            TransferError::Cancelled => format!("Failed to {operation} file: cancelled."),
            TransferError::Io(_) | TransferError::Transport(_) => {
                format!("Failed to {operation} file.")
            }
            _ => format!("Failed to {operation} file: {self}"),
        }
    }

    /// The digest computed for the payload, when the failure produced one.
    pub fn computed_digest(&self) -> Option<&str> {
        match self {
            TransferError::DigestMismatch { computed, .. }
            | TransferError::Integrity { computed, .. } => {
                Some(computed)
            }
            _ => None,
        }
    }
}

impl From<LocationError> for TransferError {
    fn from(e: LocationError) -> Self {
        TransferError::Validation(e.to_string())
    }
}

impl From<MetadataError> for TransferError {
    fn from(e: MetadataError) -> Self {
        TransferError::Validation(e.to_string())
    }
}

impl From<LocalStoreError> for TransferError {
    fn from(e: LocalStoreError) -> Self {
        match e {
            LocalStoreError::NotFound(_) => TransferError::NotFound(e.to_string()),
            LocalStoreError::PermissionDenied(_) => TransferError::Unauthorized(e.to_string()),
            LocalStoreError::Io { .. } | LocalStoreError::Sidecar { .. } => {
                TransferError::Io(e.to_string())
            }
        }
    }
}

impl From<ObjectStoreError> for TransferError {
    fn from(e: ObjectStoreError) -> Self {
        match e {
            ObjectStoreError::NotFound(_) => TransferError::NotFound(e.to_string()),
            ObjectStoreError::Unauthorized(_) => TransferError::Unauthorized(e.to_string()),
            ObjectStoreError::InvalidRequest(_) => TransferError::Validation(e.to_string()),
            ObjectStoreError::Conflict(_) => TransferError::Conflict(e.to_string()),
            ObjectStoreError::Io(_) => TransferError::Io(e.to_string()),
            ObjectStoreError::Backend(_) => TransferError::Transport(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(TransferError::Validation("x".into()).status(), 400);
        assert_eq!(TransferError::Unauthorized("x".into()).status(), 403);
        assert_eq!(TransferError::NotFound("x".into()).status(), 404);
        let conflict = TransferError::DigestMismatch {
            expected: "a".into(),
            computed: "b".into(),
        };
        assert_eq!(conflict.status(), 409);
        assert_eq!(conflict.computed_digest(), Some("b"));
        let integrity = TransferError::Integrity {
            stored: None,
            computed: "b".into(),
        };
        assert_eq!(integrity.status(), 502);
        assert_eq!(TransferError::Transport("x".into()).status(), 500);
    }

    #[test]
    fn server_errors_hide_detail_in_public_message() {
        let err = TransferError::Transport("connection reset by 10.0.0.1".into());
        assert_eq!(err.public_message("write"), "Failed to write file.");

        let err = TransferError::NotFound("Object not found: b/k".into());
        assert_eq!(
            err.public_message("read"),
            "Failed to read file: Object not found: b/k"
        );
    }
}

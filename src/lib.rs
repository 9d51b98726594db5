//! filegate - One read/write/delete interface over local files and S3-compatible object storage
//!
//! This crate provides whole-file transfers addressed by a single path string with:
//! - MD5 integrity tokens checked before any write, and stored digests re-checked after uploads
//! - Caller metadata merged with system-owned `md5` / `filesize` fields
//! - Thread-safe progress reporting for uploads and downloads
//! - Swappable object storage backends (S3 over SigV4, or a local directory)
//! - A uniform JSON result envelope for every operation

pub mod checksum;
pub mod classify;
pub mod config;
pub mod credentials;
pub mod envelope;
pub mod error;
pub mod local;
pub mod location;
pub mod manager;
pub mod metadata;
pub mod object_store;
pub mod payload;
pub mod progress;
#[cfg(test)]
pub mod testutil;

pub use envelope::ResultEnvelope;
pub use error::TransferError;
pub use location::Location;
pub use manager::{CallOptions, FileManager, WriteRequest};
pub use payload::Payload;

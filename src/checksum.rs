//! MD5 content digests used as the integrity signal for every write.

use base64::Engine;
use md5::{Digest, Md5};

/// Result of comparing a payload against a caller-supplied digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub matches: bool,
    /// Digest of the payload, returned whether or not it matched.
    pub computed: String,
}

/// Computes the MD5 of `data` and returns the lowercase hex digest.
pub fn digest(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compares `data` against `expected`, ignoring case and surrounding whitespace.
pub fn verify(data: &[u8], expected: &str) -> Verification {
    let computed = digest(data);
    let matches = computed.eq_ignore_ascii_case(expected.trim());
    Verification { matches, computed }
}

/// Base64 of the raw MD5, the form object stores expect in `Content-MD5`.
pub fn content_md5(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(Md5::digest(data))
}

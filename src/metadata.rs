//! Merging caller metadata with the system-computed integrity fields.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use thiserror::Error;

/// Metadata persisted alongside a stored file.
pub type Metadata = BTreeMap<String, String>;

/// Reserved key holding the content digest.
pub const DIGEST_KEY: &str = "md5";
/// Reserved key holding the payload size in bytes.
pub const SIZE_KEY: &str = "filesize";

const RESERVED_KEYS: [&str; 2] = [DIGEST_KEY, SIZE_KEY];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("metadata value for '{0}' cannot be converted to a string")]
    NotStringifiable(String),
    #[error("metadata keys must not be empty")]
    EmptyKey,
    #[error("metadata key '{0}' is given more than once when case is ignored")]
    DuplicateKey(String),
}

/// Fields the system computes for every write.
#[derive(Debug, Clone)]
pub struct Computed {
    pub digest: String,
    pub size: u64,
}

/// Returns true if `key` names a system-owned field. Object stores fold
/// metadata keys to lowercase, so the comparison ignores case.
pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(key))
}

/// Merge caller metadata with computed fields. Computed values replace any
/// caller entry for a reserved key. Every other key passes through folded to
/// lowercase, so each backend stores and returns the same names.
pub fn merge(caller: &HashMap<String, Value>, computed: &Computed) -> Result<Metadata, MetadataError> {
    let mut merged = Metadata::new();

    for (key, value) in caller {
        if key.trim().is_empty() {
            return Err(MetadataError::EmptyKey);
        }
        let value = stringify(key, value)?;
        if is_reserved(key) {
            tracing::warn!(key = %key, "Ignoring caller value for reserved metadata key");
            continue;
        }
        let folded = key.to_ascii_lowercase();
        if merged.insert(folded.clone(), value).is_some() {
            return Err(MetadataError::DuplicateKey(folded));
        }
    }

    merged.insert(DIGEST_KEY.to_string(), computed.digest.clone());
    merged.insert(SIZE_KEY.to_string(), computed.size.to_string());
    Ok(merged)
}

/// Look up the stored digest, tolerating case-folded keys.
pub fn stored_digest(metadata: &Metadata) -> Option<&str> {
    metadata
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(DIGEST_KEY))
        .map(|(_, v)| v.as_str())
}

/// Drop reserved keys, leaving only caller-owned entries.
pub fn caller_entries(metadata: &Metadata) -> HashMap<String, Value> {
    metadata
        .iter()
        .filter(|(k, _)| !is_reserved(k))
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

fn stringify(key: &str, value: &Value) -> Result<String, MetadataError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => {
            Err(MetadataError::NotStringifiable(key.to_string()))
        }
    }
}

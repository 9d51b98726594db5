//! AWS Signature Version 4 for S3 REST requests.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ring::{digest, hmac};

use crate::credentials::Credentials;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

/// SHA-256 of an empty body.
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, data))
}

pub fn amz_date(at: &DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Percent-encode an object key for use as a URI path, keeping `/`.
pub fn encode_path(key: &str) -> String {
    key.split('/')
        .map(uri_encode)
        .collect::<Vec<_>>()
        .join("/")
}

fn uri_encode(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Signs one request. `headers` must use lowercase names and already contain
/// `host`, `x-amz-date` and `x-amz-content-sha256`.
pub struct RequestSigner<'a> {
    pub credentials: &'a Credentials,
    pub region: &'a str,
    pub timestamp: DateTime<Utc>,
}

impl RequestSigner<'_> {
    /// Value for the `Authorization` header.
    pub fn authorization(
        &self,
        method: &str,
        canonical_uri: &str,
        canonical_query: &str,
        headers: &BTreeMap<String, String>,
        payload_hash: &str,
    ) -> String {
        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{name}:{}\n", trim_all(value)))
            .collect();

        let canonical_request = format!(
            "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
        );

        let date = self.timestamp.format("%Y%m%d").to_string();
        let scope = format!("{date}/{}/{SERVICE}/aws4_request", self.region);
        let string_to_sign = format!(
            "{ALGORITHM}\n{}\n{scope}\n{}",
            amz_date(&self.timestamp),
            sha256_hex(canonical_request.as_bytes())
        );

        let signature = hex::encode(hmac_sha256(&self.signing_key(&date), &string_to_sign));

        format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.credentials.access_key_id
        )
    }

    fn signing_key(&self, date: &str) -> Vec<u8> {
        let secret = format!("AWS4{}", self.credentials.secret_access_key);
        let k_date = hmac_sha256(secret.as_bytes(), date);
        let k_region = hmac_sha256(&k_date, self.region);
        let k_service = hmac_sha256(&k_region, SERVICE);
        hmac_sha256(&k_service, "aws4_request")
    }
}

/// Canonical header value: trimmed, with inner runs of whitespace
/// collapsed to a single space.
fn trim_all(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn hmac_sha256(key: &[u8], data: &str) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::sign(&key, data.as_bytes()).as_ref().to_vec()
}

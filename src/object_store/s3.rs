use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Body, Client, Method, Response, StatusCode, Url};

use super::sigv4::{self, RequestSigner, EMPTY_PAYLOAD_SHA256};
use super::{chunks, content_type_for, ObjectHead, ObjectStore, ObjectStoreError, PutReceipt};
use crate::checksum;
use crate::credentials::CredentialProvider;
use crate::metadata::Metadata;
use crate::progress::TransferProgress;

const META_PREFIX: &str = "x-amz-meta-";

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3Settings {
    /// Custom endpoint such as a MinIO URL. `None` means AWS.
    pub endpoint: Option<String>,
    pub region: String,
    /// Address buckets as `<endpoint>/<bucket>/<key>` instead of
    /// `<bucket>.<endpoint>/<key>`.
    pub path_style: bool,
    /// Upload body chunk size; progress advances once per chunk.
    pub chunk_size: usize,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".to_string(),
            path_style: false,
            chunk_size: 8 * 1024 * 1024,
        }
    }
}

/// S3 REST backend. Requests are signed with SigV4 using credentials
/// resolved from the injected provider on every call.
pub struct S3Store {
    client: Client,
    endpoint: Url,
    region: String,
    path_style: bool,
    chunk_size: usize,
    credentials: Arc<dyn CredentialProvider>,
}

/// Upload body with the values that must accompany it.
struct Upload {
    body: Body,
    sha256: String,
    length: usize,
}

/// A resolved request target.
struct Target {
    url: Url,
    host: String,
    canonical_uri: String,
}

impl S3Store {
    pub fn new(
        settings: &S3Settings,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, anyhow::Error> {
        let endpoint = match settings.endpoint.as_deref() {
            Some(endpoint) => Url::parse(endpoint)?,
            None => Url::parse(&format!("https://s3.{}.amazonaws.com", settings.region))?,
        };
        let Some(host) = endpoint.host_str() else {
            anyhow::bail!("S3 endpoint '{endpoint}' has no host");
        };

        // A local MinIO is never reached through a proxy.
        let mut builder = Client::builder();
        if matches!(host, "localhost" | "127.0.0.1" | "[::1]") {
            builder = builder.no_proxy();
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            endpoint,
            region: settings.region.clone(),
            path_style: settings.path_style,
            chunk_size: settings.chunk_size.max(1),
            credentials,
        })
    }

    fn target(&self, bucket: &str, key: &str) -> Result<Target, ObjectStoreError> {
        let host = self.endpoint.host_str().unwrap_or_default();
        let host = if self.path_style {
            host.to_string()
        } else {
            format!("{bucket}.{host}")
        };
        let host = match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        };

        let canonical_uri = if self.path_style {
            format!("/{bucket}/{}", sigv4::encode_path(key))
        } else {
            format!("/{}", sigv4::encode_path(key))
        };

        let url = Url::parse(&format!("{}://{host}{canonical_uri}", self.endpoint.scheme()))
            .map_err(|e| ObjectStoreError::InvalidRequest(format!("{bucket}/{key}: {e}")))?;

        Ok(Target {
            url,
            host,
            canonical_uri,
        })
    }

    /// Sign and send one request. `headers` must use lowercase names.
    async fn send(
        &self,
        method: Method,
        bucket: &str,
        key: &str,
        mut headers: BTreeMap<String, String>,
        upload: Option<Upload>,
    ) -> Result<Response, ObjectStoreError> {
        let target = self.target(bucket, key)?;
        let credentials = self
            .credentials
            .resolve()
            .map_err(|e| ObjectStoreError::Unauthorized(e.to_string()))?;

        let payload_hash = upload
            .as_ref()
            .map(|u| u.sha256.clone())
            .unwrap_or_else(|| EMPTY_PAYLOAD_SHA256.to_string());

        let now = chrono::Utc::now();
        headers.insert("host".to_string(), target.host.clone());
        headers.insert("x-amz-date".to_string(), sigv4::amz_date(&now));
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
        if let Some(token) = &credentials.session_token {
            headers.insert("x-amz-security-token".to_string(), token.clone());
        }

        let signer = RequestSigner {
            credentials: &credentials,
            region: &self.region,
            timestamp: now,
        };
        let authorization =
            signer.authorization(method.as_str(), &target.canonical_uri, "", &headers, &payload_hash);

        let mut request = self
            .client
            .request(method, target.url)
            .header(reqwest::header::AUTHORIZATION, authorization);
        for (name, value) in headers.iter().filter(|(name, _)| name.as_str() != "host") {
            request = request.header(name.as_str(), value.as_str());
        }
        // Streamed bodies carry no length of their own; S3 requires one.
        if let Some(upload) = upload {
            request = request
                .header(reqwest::header::CONTENT_LENGTH, upload.length)
                .body(upload.body);
        }

        request
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get(
        &self,
        bucket: &str,
        key: &str,
        progress: Arc<dyn TransferProgress>,
    ) -> Result<Bytes, ObjectStoreError> {
        let mut resp = self
            .send(Method::GET, bucket, key, BTreeMap::new(), None)
            .await?;
        if !resp.status().is_success() {
            return Err(status_error(resp, bucket, key).await);
        }

        let mut data = BytesMut::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?
        {
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
        let mut headers = metadata_headers(metadata)?;
        headers.insert("content-type".to_string(), content_type_for(key));
        headers.insert("content-md5".to_string(), checksum::content_md5(&data));

        let digest = checksum::digest(&data);
        let sha256 = sigv4::sha256_hex(&data);
        let length = data.len();

        let pieces = chunks(&data, self.chunk_size);
        let stream = futures_util::stream::iter(pieces.into_iter().map(move |piece| {
            progress.advance(piece.len() as u64);
            Ok::<_, std::io::Error>(piece)
        }));
        let upload = Upload {
            body: Body::wrap_stream(stream),
            sha256,
            length,
        };

        let resp = self
            .send(Method::PUT, bucket, key, headers, Some(upload))
            .await?;
        if !resp.status().is_success() {
            return Err(status_error(resp, bucket, key).await);
        }

        let etag = header_string(resp.headers(), reqwest::header::ETAG)
            .map(|e| e.trim_matches('"').to_string());
        Ok(PutReceipt { digest, etag })
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
        // S3 acknowledges deletes of missing keys, so check first.
        self.head(bucket, key).await?;

        let resp = self
            .send(Method::DELETE, bucket, key, BTreeMap::new(), None)
            .await?;
        if !resp.status().is_success() {
            return Err(status_error(resp, bucket, key).await);
        }
        Ok(())
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead, ObjectStoreError> {
        let resp = self
            .send(Method::HEAD, bucket, key, BTreeMap::new(), None)
            .await?;
        if !resp.status().is_success() {
            return Err(status_error(resp, bucket, key).await);
        }

        let headers = resp.headers();
        let metadata = headers
            .iter()
            .filter_map(|(name, value)| {
                let key = name.as_str().strip_prefix(META_PREFIX)?;
                Some((key.to_string(), value.to_str().ok()?.to_string()))
            })
            .collect();

        Ok(ObjectHead {
            size: header_string(headers, reqwest::header::CONTENT_LENGTH)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            content_type: header_string(headers, reqwest::header::CONTENT_TYPE),
            etag: header_string(headers, reqwest::header::ETAG)
                .map(|e| e.trim_matches('"').to_string()),
            metadata,
        })
    }
}

/// Map metadata onto `x-amz-meta-*` headers, refusing anything S3 would
/// mangle or drop rather than losing it silently.
fn metadata_headers(metadata: &Metadata) -> Result<BTreeMap<String, String>, ObjectStoreError> {
    let mut headers = BTreeMap::new();
    for (key, value) in metadata {
        let name = format!("{META_PREFIX}{}", key.to_ascii_lowercase());
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(ObjectStoreError::InvalidRequest(format!(
                "metadata key '{key}' is not a valid header name"
            )));
        }
        if !value.is_ascii() || HeaderValue::from_str(value).is_err() {
            return Err(ObjectStoreError::InvalidRequest(format!(
                "metadata value for '{key}' must be printable ASCII"
            )));
        }
        if headers.insert(name, value.clone()).is_some() {
            return Err(ObjectStoreError::InvalidRequest(format!(
                "metadata key '{key}' collides with another key after lowercasing"
            )));
        }
    }
    Ok(headers)
}

fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

async fn status_error(resp: Response, bucket: &str, key: &str) -> ObjectStoreError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let object = format!("{bucket}/{key}");
    match status {
        StatusCode::NOT_FOUND => ObjectStoreError::NotFound(object),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ObjectStoreError::Unauthorized(format!("{object} ({status})"))
        }
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
            ObjectStoreError::Conflict(format!("{object} ({status})"))
        }
        _ => ObjectStoreError::Backend(format!("S3 request for {object} failed ({status}): {body}")),
    }
}

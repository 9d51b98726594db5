use std::sync::{Arc, Mutex};

use bytes::Bytes;
use filegate::checksum;
use filegate::credentials::{CredentialError, CredentialProvider, Credentials, StaticCredentials};
use filegate::metadata::Metadata;
use filegate::object_store::{ObjectStore, ObjectStoreError, S3Settings, S3Store};
use filegate::progress::{NoProgress, ProgressReporter, ProgressUpdate};
use mockito::Matcher;

fn store(server: &mockito::ServerGuard) -> S3Store {
    let settings = S3Settings {
        endpoint: Some(server.url()),
        path_style: true,
        chunk_size: 2,
        ..Default::default()
    };
    S3Store::new(&settings, Arc::new(StaticCredentials::new("AKIDEXAMPLE", "secret"))).unwrap()
}

#[tokio::test]
async fn test_s3_put_sends_signed_metadata() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", "/bucket/docs/k.txt")
        .match_header(
            "authorization",
            Matcher::Regex("^AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/".to_string()),
        )
        .match_header("x-amz-meta-md5", "5d41402abc4b2a76b9719d911017c592")
        .match_header("x-amz-meta-owner", "ops")
        .match_header("content-md5", checksum::content_md5(b"hello").as_str())
        .match_header("content-type", "text/plain")
        .match_body("hello")
        .with_status(200)
        .with_header("etag", "\"5d41402abc4b2a76b9719d911017c592\"")
        .create_async()
        .await;

    let mut metadata = Metadata::new();
    metadata.insert("md5".to_string(), "5d41402abc4b2a76b9719d911017c592".to_string());
    metadata.insert("owner".to_string(), "ops".to_string());

    let progress = Arc::new(ProgressReporter::new("upload", 5));
    let receipt = store(&server)
        .put("bucket", "docs/k.txt", Bytes::from("hello"), &metadata, progress.clone())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(receipt.digest, "5d41402abc4b2a76b9719d911017c592");
    assert_eq!(receipt.etag.as_deref(), Some("5d41402abc4b2a76b9719d911017c592"));
    assert_eq!(progress.bytes_transferred(), 5);
}

#[tokio::test]
async fn test_s3_get_returns_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/bucket/blob")
        .with_status(200)
        .with_body([0u8, 1, 2])
        .create_async()
        .await;

    let progress = Arc::new(ProgressReporter::new("download", 3));
    let data = store(&server)
        .get("bucket", "blob", progress.clone())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(data, Bytes::from_static(&[0, 1, 2]));
    assert_eq!(progress.bytes_transferred(), 3);
}

#[tokio::test]
async fn test_s3_empty_get_reports_progress() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/bucket/empty")
        .with_status(200)
        .create_async()
        .await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let progress = Arc::new(ProgressReporter::with_notifier(
        "download",
        0,
        Box::new(move |u: &ProgressUpdate| sink.lock().unwrap().push(u.percent)),
    ));
    let data = store(&server).get("bucket", "empty", progress).await.unwrap();

    assert!(data.is_empty());
    assert_eq!(*seen.lock().unwrap(), vec![100.0]);
}

#[tokio::test]
async fn test_s3_status_mapping() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/bucket/missing")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/bucket/secret")
        .with_status(403)
        .create_async()
        .await;
    server
        .mock("GET", "/bucket/broken")
        .with_status(503)
        .with_body("SlowDown")
        .create_async()
        .await;

    let store = store(&server);
    let missing = store.get("bucket", "missing", Arc::new(NoProgress)).await;
    assert!(matches!(missing, Err(ObjectStoreError::NotFound(_))));

    let secret = store.get("bucket", "secret", Arc::new(NoProgress)).await;
    assert!(matches!(secret, Err(ObjectStoreError::Unauthorized(_))));

    let broken = store.get("bucket", "broken", Arc::new(NoProgress)).await;
    match broken {
        Err(ObjectStoreError::Backend(message)) => assert!(message.contains("SlowDown")),
        other => panic!("expected backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_s3_head_parses_metadata() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("HEAD", "/bucket/k")
        .with_status(200)
        .with_header("content-type", "application/octet-stream")
        .with_header("etag", "\"abc\"")
        .with_header("x-amz-meta-md5", "5d41402abc4b2a76b9719d911017c592")
        .with_header("x-amz-meta-filesize", "5")
        .create_async()
        .await;

    let head = store(&server).head("bucket", "k").await.unwrap();

    mock.assert_async().await;
    assert_eq!(head.content_type.as_deref(), Some("application/octet-stream"));
    assert_eq!(head.etag.as_deref(), Some("abc"));
    assert_eq!(
        head.metadata.get("md5").map(String::as_str),
        Some("5d41402abc4b2a76b9719d911017c592")
    );
    assert_eq!(head.metadata.get("filesize").map(String::as_str), Some("5"));
}

#[tokio::test]
async fn test_s3_delete_missing_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("HEAD", "/bucket/gone")
        .with_status(404)
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/bucket/gone")
        .with_status(204)
        .expect(0)
        .create_async()
        .await;

    let result = store(&server).delete("bucket", "gone").await;

    assert!(matches!(result, Err(ObjectStoreError::NotFound(_))));
    delete.assert_async().await;
}

#[tokio::test]
async fn test_s3_delete_existing() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("HEAD", "/bucket/k")
        .with_status(200)
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/bucket/k")
        .with_status(204)
        .create_async()
        .await;

    store(&server).delete("bucket", "k").await.unwrap();
    delete.assert_async().await;
}

struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn resolve(&self) -> Result<Credentials, CredentialError> {
        Err(CredentialError::Missing("AWS_ACCESS_KEY_ID".to_string()))
    }
}

#[tokio::test]
async fn test_s3_missing_credentials_is_unauthorized() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let settings = S3Settings {
        endpoint: Some(server.url()),
        path_style: true,
        ..Default::default()
    };
    let store = S3Store::new(&settings, Arc::new(NoCredentials)).unwrap();
    let result = store.get("bucket", "k", Arc::new(NoProgress)).await;

    assert!(matches!(result, Err(ObjectStoreError::Unauthorized(_))));
    mock.assert_async().await;
}

use bytes::Bytes;
use filegate::local::{LocalFiles, LocalStoreError};
use filegate::metadata::Metadata;
use filegate::payload::Payload;

#[tokio::test]
async fn test_local_write_read_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("note.txt");
    let files = LocalFiles::new();

    files
        .write(&path, &Payload::from("line one\nline two\n"), &Metadata::new())
        .await
        .unwrap();

    let data = files.read(&path).await.unwrap();
    assert_eq!(data, Bytes::from("line one\nline two\n"));
}

#[tokio::test]
async fn test_local_write_binary_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blob.bin");
    let files = LocalFiles::new();

    files
        .write(&path, &Payload::from(vec![1u8; 64]), &Metadata::new())
        .await
        .unwrap();
    files
        .write(&path, &Payload::from(vec![0u8, 255]), &Metadata::new())
        .await
        .unwrap();

    assert_eq!(files.read(&path).await.unwrap(), Bytes::from_static(&[0, 255]));
    // No temp files are left behind.
    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_local_read_missing() {
    let dir = tempfile::tempdir().unwrap();
    let result = LocalFiles::new().read(&dir.path().join("missing")).await;
    assert!(matches!(result, Err(LocalStoreError::NotFound(_))));
}

#[tokio::test]
async fn test_local_write_into_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no-such-dir").join("file.txt");

    let result = LocalFiles::new()
        .write(&path, &Payload::from("x"), &Metadata::new())
        .await;
    assert!(matches!(result, Err(LocalStoreError::Io { .. })));
}

#[tokio::test]
async fn test_local_delete() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gone.txt");
    let files = LocalFiles::new();

    files
        .write(&path, &Payload::from("bye"), &Metadata::new())
        .await
        .unwrap();
    files.delete(&path).await.unwrap();

    assert!(!path.exists());
    let again = files.delete(&path).await;
    assert!(matches!(again, Err(LocalStoreError::NotFound(_))));
}

#[tokio::test]
async fn test_local_sidecar_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.csv");
    let files = LocalFiles::new().with_metadata_sidecar(true);

    let mut metadata = Metadata::new();
    metadata.insert("md5".to_string(), "abc".to_string());
    metadata.insert("owner".to_string(), "finance".to_string());
    files
        .write(&path, &Payload::from("a,b\n"), &metadata)
        .await
        .unwrap();

    let sidecar = dir.path().join("report.csv.metadata.json");
    assert!(sidecar.is_file());

    let stat = files.stat(&path).await.unwrap();
    assert_eq!(stat.size, 4);
    assert_eq!(stat.metadata, Some(metadata));

    files.delete(&path).await.unwrap();
    assert!(!sidecar.exists());
}

#[tokio::test]
async fn test_local_stat_without_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.txt");
    let files = LocalFiles::new();

    files
        .write(&path, &Payload::from("plain"), &Metadata::new())
        .await
        .unwrap();

    let stat = files.stat(&path).await.unwrap();
    assert_eq!(stat.size, 5);
    assert!(stat.metadata.is_none());
    assert!(!dir.path().join("plain.txt.metadata.json").exists());
}

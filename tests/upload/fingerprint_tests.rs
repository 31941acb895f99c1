// Fingerprint tests on files of different sizes

use bucketsync::sync::{fingerprint, fingerprint_bytes};
use bucketsync::SyncError;
use std::path::Path;
use tempfile::TempDir;

use super::common::write_file;

#[tokio::test]
async fn test_fingerprint_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "a.txt", b"stable content");

    let first = fingerprint(&path).await.unwrap();
    let second = fingerprint(&path).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_single_byte_change_changes_fingerprint() {
    let dir = TempDir::new().unwrap();
    let mut data = vec![0u8; 300_000];
    let path = write_file(dir.path(), "big.bin", &data);
    let before = fingerprint(&path).await.unwrap();

    data[150_000] = 1;
    write_file(dir.path(), "big.bin", &data);
    let after = fingerprint(&path).await.unwrap();

    assert_ne!(before, after);
    assert_eq!(after, fingerprint_bytes(&data));
}

#[tokio::test]
async fn test_identical_files_share_fingerprint() {
    let dir = TempDir::new().unwrap();
    let a = write_file(dir.path(), "a/copy.txt", b"same");
    let b = write_file(dir.path(), "b/copy.txt", b"same");

    assert_eq!(fingerprint(&a).await.unwrap(), fingerprint(&b).await.unwrap());
}

#[tokio::test]
async fn test_empty_file() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "empty", b"");

    assert_eq!(fingerprint(&path).await.unwrap().as_str(), "1B2M2Y8AsgTpgAmY7PhCfg==");
}

#[tokio::test]
async fn test_directory_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = fingerprint(dir.path()).await.unwrap_err();
    assert!(matches!(err, SyncError::Io { .. }));

    let err = fingerprint(Path::new("/no/such/file")).await.unwrap_err();
    assert!(matches!(err, SyncError::Io { .. }));
}

// Batch driver tests: idempotence, first-failure-stops, visibility, progress

use std::sync::Arc;

use bucketsync::store::{MemoryStore, Visibility};
use bucketsync::sync::{
    LocalFile, SyncPhase, SyncStatus, TransferOutcome, UploadPolicy,
};
use bucketsync::{SyncError, UploaderConfig};
use tempfile::TempDir;
use tokio::sync::mpsc;

use super::common::{config, site_tree, uploader, uploader_with, write_file};

#[tokio::test]
async fn test_upload_tree_then_rerun_skips_everything() {
    let site = site_tree();
    let store = MemoryStore::new();

    let stats = uploader(&store).upload(site.path(), "www").await.unwrap();
    assert_eq!(stats.files_selected, 5);
    assert_eq!(stats.files_uploaded, 5);
    assert_eq!(stats.files_skipped, 0);
    assert_eq!(store.write_count(), 5);
    assert_eq!(
        store.keys(),
        vec![
            "www/.DS_Store",
            "www/css/site.css",
            "www/drafts/wip.html",
            "www/img/logo.png",
            "www/index.html",
        ]
    );

    let again = uploader(&store).upload(site.path(), "www").await.unwrap();
    assert_eq!(again.files_uploaded, 0);
    assert_eq!(again.files_skipped, 5);
    assert_eq!(again.bytes_transferred, 0);
    assert_eq!(store.write_count(), 5);
}

#[tokio::test]
async fn test_only_modified_file_is_reuploaded() {
    let site = site_tree();
    let store = MemoryStore::new();
    uploader(&store).upload(site.path(), "www").await.unwrap();

    write_file(site.path(), "css/site.css", b"body { margin: 1px }");
    let stats = uploader(&store).upload(site.path(), "www").await.unwrap();

    assert_eq!(stats.files_uploaded, 1);
    assert_eq!(stats.files_skipped, 4);
    assert_eq!(
        &store.get("www/css/site.css").unwrap().data[..],
        b"body { margin: 1px }"
    );
}

#[tokio::test]
async fn test_filters_apply_during_upload() {
    let site = site_tree();
    let store = MemoryStore::new();
    let config = UploaderConfig {
        allow: vec!["**/*.html".into(), "**/*.css".into()],
        disallow: vec!["drafts/**".into(), "**/.DS_Store".into()],
        ..config()
    };

    let stats = uploader_with(&store, &config)
        .upload(site.path(), "www")
        .await
        .unwrap();

    assert_eq!(stats.files_uploaded, 2);
    assert_eq!(store.keys(), vec!["www/css/site.css", "www/index.html"]);
}

#[tokio::test]
async fn test_first_failure_stops_batch() {
    let dir = TempDir::new().unwrap();
    let files: Vec<LocalFile> = ["one.txt", "two.txt", "three.txt"]
        .iter()
        .map(|name| LocalFile::new(write_file(dir.path(), name, name.as_bytes()), format!("out/{}", name)))
        .collect();

    let store = MemoryStore::new();
    store.fail_writes_for("out/two.txt");
    let mut uploader = uploader(&store);

    let err = uploader.upload_all(&files).await.unwrap_err();

    assert!(matches!(err, SyncError::Transfer { ref key, .. } if key == "out/two.txt"));
    assert_eq!(store.write_attempts(), vec!["out/one.txt", "out/two.txt"]);
    assert!(store.get("out/one.txt").is_some());
    assert!(store.get("out/three.txt").is_none());
    assert_eq!(store.aborts(), vec!["out/two.txt"]);
    assert!(matches!(uploader.status(), SyncStatus::Failed { .. }));
}

#[tokio::test]
async fn test_mid_stream_failure_aborts_and_stops_batch() {
    let dir = TempDir::new().unwrap();
    let files: Vec<LocalFile> = ["one.txt", "two.txt", "three.txt"]
        .iter()
        .map(|name| LocalFile::new(write_file(dir.path(), name, name.as_bytes()), format!("out/{}", name)))
        .collect();

    let store = MemoryStore::new();
    store.fail_chunks_for("out/two.txt");

    let err = uploader(&store).upload_all(&files).await.unwrap_err();

    match err {
        SyncError::Transfer { key, reason, .. } => {
            assert_eq!(key, "out/two.txt");
            assert!(reason.contains("write failed"));
        }
        other => panic!("Expected Transfer, got {:?}", other),
    }
    assert_eq!(store.aborts(), vec!["out/two.txt"]);
    assert_eq!(store.write_attempts(), vec!["out/one.txt", "out/two.txt"]);
    assert_eq!(store.keys(), vec!["out/one.txt"]);
}

#[tokio::test]
async fn test_concurrent_failure_aborts_in_flight_uploads() {
    let dir = TempDir::new().unwrap();
    let files = vec![
        LocalFile::new(write_file(dir.path(), "a", b"stalls"), "a"),
        LocalFile::new(write_file(dir.path(), "b", b"fails"), "b"),
        LocalFile::new(write_file(dir.path(), "c", b"queued"), "c"),
    ];

    let store = MemoryStore::new();
    store.stall_chunks_for("a");
    store.fail_writes_for("b");
    let config = UploaderConfig {
        concurrency: 2,
        ..config()
    };
    let mut uploader = uploader_with(&store, &config);

    let err = uploader.upload_all(&files).await.unwrap_err();
    assert!(matches!(err, SyncError::Transfer { ref key, .. } if key == "b"));
    assert!(matches!(uploader.status(), SyncStatus::Failed { .. }));

    // Writers still open when the batch stopped are aborted in the background
    let unfinished = |store: &MemoryStore| {
        let mut keys: Vec<String> = store
            .write_attempts()
            .into_iter()
            .filter(|key| store.get(key).is_none())
            .collect();
        keys.sort();
        keys
    };
    for _ in 0..100 {
        let mut aborted = store.aborts();
        aborted.sort();
        if aborted == unfinished(&store) {
            break;
        }
        tokio::task::yield_now().await;
    }

    let mut aborted = store.aborts();
    aborted.sort();
    assert_eq!(aborted, unfinished(&store));
    assert!(aborted.contains(&"b".to_string()));
    assert!(!store.write_attempts().contains(&"c".to_string()));
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_remote_error_stops_batch() {
    let dir = TempDir::new().unwrap();
    let files = vec![
        LocalFile::new(write_file(dir.path(), "a", b"a"), "a"),
        LocalFile::new(write_file(dir.path(), "b", b"b"), "b"),
    ];

    let store = MemoryStore::new();
    store.fail_metadata_for("a");

    let err = uploader(&store).upload_all(&files).await.unwrap_err();
    assert!(matches!(err, SyncError::Remote { ref key, .. } if key == "a"));
    assert!(store.write_attempts().is_empty());
}

#[tokio::test]
async fn test_bounded_concurrency_uploads_everything() {
    let dir = TempDir::new().unwrap();
    for i in 0..20 {
        write_file(dir.path(), &format!("batch/{:02}.bin", i), format!("payload {}", i).as_bytes());
    }

    let store = MemoryStore::new();
    let config = UploaderConfig {
        concurrency: 4,
        ..config()
    };

    let stats = uploader_with(&store, &config)
        .upload(dir.path(), "")
        .await
        .unwrap();

    assert_eq!(stats.files_uploaded, 20);
    assert_eq!(store.keys().len(), 20);
    assert!(store.keys().iter().all(|key| key.starts_with("batch/")));
}

#[tokio::test]
async fn test_public_flag_sets_visibility() {
    let site = site_tree();
    let store = MemoryStore::new();
    let config = UploaderConfig {
        public: true,
        ..config()
    };

    uploader_with(&store, &config).upload(site.path(), "").await.unwrap();

    let index = store.get("index.html").unwrap();
    assert_eq!(index.visibility, Visibility::Public);
    assert_eq!(index.content_type, "text/html");
    assert_eq!(store.get("img/logo.png").unwrap().content_type, "image/png");
}

struct PublicImagesOnly;

impl UploadPolicy for PublicImagesOnly {
    fn visibility(&self, file: &LocalFile) -> Visibility {
        if file.destination.starts_with("img/") {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}

#[tokio::test]
async fn test_custom_policy_per_file() {
    let site = site_tree();
    let store = MemoryStore::new();

    uploader(&store)
        .with_policy(Arc::new(PublicImagesOnly))
        .upload(site.path(), "")
        .await
        .unwrap();

    assert_eq!(store.get("img/logo.png").unwrap().visibility, Visibility::Public);
    assert_eq!(store.get("index.html").unwrap().visibility, Visibility::Private);
}

#[tokio::test]
async fn test_progress_events() {
    let site = site_tree();
    let store = MemoryStore::new();
    let (tx, mut rx) = mpsc::channel(64);

    let mut uploader = uploader(&store).with_progress(tx);
    uploader.upload(site.path(), "www").await.unwrap();
    drop(uploader);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert_eq!(events.first().unwrap().phase, SyncPhase::Selecting);
    let last = events.last().unwrap();
    assert_eq!(last.phase, SyncPhase::Complete);
    assert_eq!(last.files_done, 5);
    assert_eq!(last.total_files, 5);

    let uploads: Vec<_> = events
        .iter()
        .filter(|event| event.phase == SyncPhase::Uploading)
        .collect();
    assert_eq!(uploads.len(), 5);
    assert!(uploads
        .iter()
        .all(|event| matches!(event.outcome, Some(TransferOutcome::Uploaded { .. }))));
}

#[tokio::test]
async fn test_completed_status_carries_stats() {
    let site = site_tree();
    let store = MemoryStore::new();
    let mut uploader = uploader(&store);

    let stats = uploader.upload(site.path(), "").await.unwrap();
    match uploader.status() {
        SyncStatus::Completed { stats: recorded } => assert_eq!(recorded, &stats),
        other => panic!("Expected Completed, got {:?}", other),
    }
}

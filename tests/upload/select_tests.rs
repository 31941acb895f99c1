// File selection tests against real directory trees

use std::collections::BTreeSet;
use std::path::PathBuf;

use bucketsync::sync::{select_files, select_files_with_rng, FilterSet, LocalFile};
use bucketsync::SyncError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

use super::common::{site_tree, write_file};

fn destinations(files: &[LocalFile]) -> BTreeSet<String> {
    files.iter().map(|f| f.destination.clone()).collect()
}

#[tokio::test]
async fn test_empty_filters_select_all_regular_files() {
    let site = site_tree();
    let files = select_files(site.path(), "", &FilterSet::allow_all()).await.unwrap();

    assert_eq!(files.len(), 5);
    assert!(files.iter().all(|f| f.origin.is_file()));
    assert!(destinations(&files).contains(".DS_Store"));
}

#[tokio::test]
async fn test_destination_preserves_subtree() {
    let root = TempDir::new().unwrap();
    let origin = write_file(root.path(), "b/c.txt", b"c");

    let files = select_files(root.path(), "out", &FilterSet::allow_all()).await.unwrap();

    assert_eq!(files, vec![LocalFile::new(origin, "out/b/c.txt")]);
}

#[tokio::test]
async fn test_disallow_beats_allow() {
    let site = site_tree();
    let filter = FilterSet::new(&["**/*.html"], &["drafts/**"]).unwrap();

    let files = select_files(site.path(), "www", &filter).await.unwrap();

    assert_eq!(
        destinations(&files),
        BTreeSet::from(["www/index.html".to_string()])
    );
}

#[tokio::test]
async fn test_patterns_match_walked_path() {
    let site = site_tree();
    let walked = format!("{}/img/*", site.path().display());
    let filter = FilterSet::new(&[] as &[&str], &[walked.as_str()]).unwrap();

    let files = select_files(site.path(), "", &filter).await.unwrap();

    assert_eq!(files.len(), 4);
    assert!(!destinations(&files).contains("img/logo.png"));
}

#[tokio::test]
async fn test_wildcards_do_not_enter_hidden_directories() {
    let root = TempDir::new().unwrap();
    write_file(root.path(), "a.html", b"a");
    write_file(root.path(), ".well-known/x.html", b"x");

    let filter = FilterSet::new(&["**/*.html"], &[] as &[&str]).unwrap();
    let files = select_files(root.path(), "", &filter).await.unwrap();
    assert_eq!(destinations(&files), BTreeSet::from(["a.html".to_string()]));

    let filter = FilterSet::new(&[".well-known/*.html"], &[] as &[&str]).unwrap();
    let files = select_files(root.path(), "", &filter).await.unwrap();
    assert_eq!(
        destinations(&files),
        BTreeSet::from([".well-known/x.html".to_string()])
    );
}

#[tokio::test]
async fn test_shuffle_is_permutation() {
    let root = TempDir::new().unwrap();
    for i in 0..40 {
        write_file(root.path(), &format!("d{}/f{:02}.txt", i % 4, i), b"x");
    }

    let mut rng = StdRng::seed_from_u64(42);
    let first = select_files_with_rng(root.path(), "p", &FilterSet::allow_all(), &mut rng)
        .await
        .unwrap();
    let second = select_files_with_rng(root.path(), "p", &FilterSet::allow_all(), &mut rng)
        .await
        .unwrap();

    assert_eq!(first.len(), 40);
    assert_eq!(destinations(&first).len(), 40);
    assert_eq!(destinations(&first), destinations(&second));
    // Two draws from one RNG over 40 items coincide with probability 1/40!
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_missing_root_is_traversal_error() {
    let err = select_files(&PathBuf::from("/no/such/root"), "", &FilterSet::allow_all())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Traversal { .. }));
}

#[tokio::test]
async fn test_file_root_is_traversal_error() {
    let root = TempDir::new().unwrap();
    let file = write_file(root.path(), "plain.txt", b"x");

    let err = select_files(&file, "", &FilterSet::allow_all()).await.unwrap_err();
    assert!(matches!(err, SyncError::Traversal { ref reason, .. } if reason == "not a directory"));
}

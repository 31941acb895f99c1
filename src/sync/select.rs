//! File selection: walk the origin tree, filter, shuffle, map to keys.

use jwalk::WalkDir;
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::store::normalize_key;
use crate::sync::filter::{FilterDecision, FilterSet};

/// A local file paired with the key it uploads to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalFile {
    pub origin: PathBuf,
    pub destination: String,
}

impl LocalFile {
    pub fn new(origin: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
        }
    }
}

/// Map a root-relative path under `destination_root`, keeping the subtree.
///
/// `("out", "b/c.txt")` becomes `out/b/c.txt`. Returns `None` when a path
/// component is not valid UTF-8, since it has no faithful key.
pub fn destination_key(destination_root: &str, relative: &Path) -> Option<String> {
    let relative = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_str()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?
        .join("/");

    Some(normalize_key(&format!("{}/{}", destination_root, relative)))
}

/// Recursively collect all regular files under `root`.
///
/// Symlinks are not followed. A missing or unreadable root, or any
/// directory that cannot be read during the walk, fails the whole listing.
pub fn walk_files(root: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let metadata = std::fs::metadata(root).map_err(|e| SyncError::traversal(root, e))?;
    if !metadata.is_dir() {
        return Err(SyncError::traversal(root, "not a directory"));
    }

    let mut files = Vec::new();
    for entry_result in WalkDir::new(root)
        .parallelism(jwalk::Parallelism::RayonNewPool(0))
        .skip_hidden(false)
        .follow_links(false)
        .sort(true)
    {
        let entry = entry_result.map_err(|e| SyncError::traversal(root, e))?;

        // Only process regular files
        if entry.file_type().is_file() {
            files.push(entry.path());
        }
    }

    Ok(files)
}

/// Walk `root` on the blocking pool.
pub async fn list_files(root: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let owned = root.to_path_buf();
    tokio::task::spawn_blocking(move || walk_files(&owned))
        .await
        .map_err(|e| SyncError::traversal(root, e))?
}

/// Filter, shuffle and map walked paths to upload descriptors.
///
/// Files whose relative path is not valid UTF-8 are skipped with a warning.
pub fn plan_files<R: Rng + ?Sized>(
    root: &Path,
    files: Vec<PathBuf>,
    destination_root: &str,
    filter: &FilterSet,
    rng: &mut R,
) -> Vec<LocalFile> {
    let mut selected: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(files.len());

    for path in files {
        let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        match filter.decide(&[relative.as_path(), path.as_path()]) {
            FilterDecision::Selected => selected.push((path, relative)),
            FilterDecision::Disallowed => debug!("Disallowed by pattern: {}", path.display()),
            FilterDecision::NotAllowed => debug!("Not matched by allow patterns: {}", path.display()),
        }
    }

    selected.shuffle(rng);

    selected
        .into_iter()
        .filter_map(|(origin, relative)| match destination_key(destination_root, &relative) {
            Some(destination) => Some(LocalFile { origin, destination }),
            None => {
                warn!("Skipping {}: name is not valid UTF-8", origin.display());
                None
            }
        })
        .collect()
}

/// Select the files under `root` to upload to `destination_root`, in random order.
pub async fn select_files(
    root: &Path,
    destination_root: &str,
    filter: &FilterSet,
) -> Result<Vec<LocalFile>, SyncError> {
    let files = list_files(root).await?;
    let total = files.len();
    let selected = plan_files(root, files, destination_root, filter, &mut rand::thread_rng());
    debug!("Selected {} of {} files under {}", selected.len(), total, root.display());
    Ok(selected)
}

/// Like [`select_files`] with a caller-supplied RNG.
pub async fn select_files_with_rng<R: Rng + Send + ?Sized>(
    root: &Path,
    destination_root: &str,
    filter: &FilterSet,
    rng: &mut R,
) -> Result<Vec<LocalFile>, SyncError> {
    let files = list_files(root).await?;
    Ok(plan_files(root, files, destination_root, filter, rng))
}

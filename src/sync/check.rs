//! Existence check: is the remote copy already identical to the local file?

use std::path::Path;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::store::ObjectRef;
use crate::sync::hash::fingerprint;

/// Compare the local file's fingerprint with the stored digest of `object`.
///
/// The local hash runs while the metadata fetch is in flight, but only the
/// fetch is awaited first: not-found returns `false` at once and drops the
/// hash, and any other remote failure is reported before a local read failure.
pub async fn is_up_to_date(local_path: &Path, object: &ObjectRef) -> Result<bool, SyncError> {
    let remote = object.metadata();
    let local = fingerprint(local_path);
    tokio::pin!(remote, local);

    let (metadata, hashed) = tokio::select! {
        biased;
        metadata = &mut remote => (metadata, None),
        hashed = &mut local => ((&mut remote).await, Some(hashed)),
    };

    let metadata = match metadata {
        Ok(metadata) => metadata,
        Err(err) if err.is_not_found() => {
            debug!("{} not present remotely", object.display_path());
            return Ok(false);
        }
        Err(err) => {
            return Err(SyncError::Remote {
                key: object.key().to_string(),
                source: err,
            })
        }
    };

    let local = match hashed {
        Some(hashed) => hashed?,
        None => local.await?,
    };

    match metadata.content_md5 {
        Some(remote) => Ok(remote == local),
        None => {
            warn!(
                "{} has no stored MD5; treating it as stale",
                object.display_path()
            );
            Ok(false)
        }
    }
}

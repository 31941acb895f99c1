//! Single-file transfer: skip when unchanged, otherwise stream to the store.

use bytes::{Bytes, BytesMut};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::store::{ObjectRef, ObjectStore, ObjectWriter, StoreError, Visibility, WriteOptions};
use crate::sync::check::is_up_to_date;
use crate::sync::select::LocalFile;

/// Content type used when the extension is unknown.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Bytes read from the origin per write call.
const READ_CHUNK_SIZE: usize = 1024 * 1024;

/// Best-effort content type from the file name.
pub fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// Per-object write policy.
pub trait UploadPolicy: Send + Sync {
    fn visibility(&self, file: &LocalFile) -> Visibility;

    fn content_type(&self, file: &LocalFile) -> String {
        guess_content_type(&file.origin)
    }
}

/// One visibility for the whole batch, content type from the extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPolicy {
    pub visibility: Visibility,
}

impl StaticPolicy {
    pub fn new(visibility: Visibility) -> Self {
        Self { visibility }
    }
}

impl UploadPolicy for StaticPolicy {
    fn visibility(&self, _file: &LocalFile) -> Visibility {
        self.visibility
    }
}

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Uploaded { bytes: u64 },
    Skipped,
}

/// Uploads one file at a time into a store.
#[derive(Clone)]
pub struct Transfer {
    store: Arc<dyn ObjectStore>,
    policy: Arc<dyn UploadPolicy>,
}

impl Transfer {
    pub fn new(store: Arc<dyn ObjectStore>, policy: Arc<dyn UploadPolicy>) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Upload `file` unless the remote copy already has the same fingerprint.
    pub async fn upload_one(&self, file: &LocalFile) -> Result<TransferOutcome, SyncError> {
        let object = ObjectRef::new(Arc::clone(&self.store), file.destination.as_str());

        if is_up_to_date(&file.origin, &object).await? {
            debug!("{} has already been uploaded. Skipping.", object.display_path());
            return Ok(TransferOutcome::Skipped);
        }

        let options = WriteOptions {
            visibility: self.policy.visibility(file),
            content_type: self.policy.content_type(file),
        };

        let mut source = tokio::fs::File::open(&file.origin)
            .await
            .map_err(|e| SyncError::io(e, "opening", &file.origin))?;

        let writer = object
            .open_writer(&options)
            .await
            .map_err(|e| SyncError::transfer(&file.origin, &file.destination, e))?;
        let mut pending = PendingWrite::new(writer, object.display_path());

        match pump(&mut source, &mut pending).await {
            Ok(bytes) => {
                pending
                    .close()
                    .await
                    .map_err(|e| SyncError::transfer(&file.origin, &file.destination, e))?;
                debug!(
                    "Uploaded {} to {} ({}, {})",
                    file.origin.display(),
                    object.display_path(),
                    options.content_type,
                    options.visibility
                );
                Ok(TransferOutcome::Uploaded { bytes })
            }
            Err(reason) => {
                pending.abort().await;
                Err(SyncError::transfer(&file.origin, &file.destination, reason))
            }
        }
    }
}

/// An open writer that has been neither committed nor discarded.
///
/// A failed commit is followed by an abort. Dropping the guard while the
/// writer is still open (a cancelled transfer) aborts it on the runtime.
struct PendingWrite {
    writer: Option<Box<dyn ObjectWriter>>,
    location: String,
}

impl PendingWrite {
    fn new(writer: Box<dyn ObjectWriter>, location: String) -> Self {
        Self {
            writer: Some(writer),
            location,
        }
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), StoreError> {
        match self.writer.as_mut() {
            Some(writer) => writer.write(chunk).await,
            None => Err(StoreError::Backend("writer already finished".to_string())),
        }
    }

    async fn close(mut self) -> Result<(), StoreError> {
        let result = match self.writer.as_mut() {
            Some(writer) => writer.close().await,
            None => Ok(()),
        };

        match result {
            Ok(()) => {
                self.writer = None;
                Ok(())
            }
            Err(err) => {
                self.abort().await;
                Err(err)
            }
        }
    }

    async fn abort(mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(err) = writer.abort().await {
                warn!("Failed to abort upload to {}: {}", self.location, err);
            }
        }
        self.writer = None;
    }
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        let location = std::mem::take(&mut self.location);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Aborting cancelled upload to {}", location);
                handle.spawn(async move {
                    if let Err(err) = writer.abort().await {
                        warn!("Failed to abort upload to {}: {}", location, err);
                    }
                });
            }
            Err(_) => warn!("Upload to {} dropped outside a runtime; not aborted", location),
        }
    }
}

/// Drain `source` into `writer`, returning the byte count.
async fn pump(source: &mut tokio::fs::File, writer: &mut PendingWrite) -> Result<u64, String> {
    let mut buffer = BytesMut::with_capacity(READ_CHUNK_SIZE);
    let mut total = 0u64;

    loop {
        buffer.reserve(READ_CHUNK_SIZE);
        let bytes_read = source
            .read_buf(&mut buffer)
            .await
            .map_err(|e| format!("read failed: {}", e))?;
        if bytes_read == 0 {
            break;
        }

        total += bytes_read as u64;
        writer
            .write(buffer.split().freeze())
            .await
            .map_err(|e| format!("write failed: {}", e))?;
    }

    Ok(total)
}

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::sync::hash::Fingerprint;

/// Backend type information for display and identification
#[derive(Debug, Clone, PartialEq)]
pub enum BackendType {
    Gcs { bucket: String },
    S3 { bucket: String, region: String },
    Memory,
}

impl BackendType {
    /// Get a short display name for the backend
    pub fn short_name(&self) -> &'static str {
        match self {
            BackendType::Gcs { .. } => "GCS",
            BackendType::S3 { .. } => "S3",
            BackendType::Memory => "Memory",
        }
    }
}

/// Errors reported by an object store.
///
/// `NotFound` must stay distinguishable: the existence check relies on it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("unsupported by this backend: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<opendal::Error> for StoreError {
    fn from(err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::NotFound => StoreError::NotFound(err.to_string()),
            opendal::ErrorKind::PermissionDenied => StoreError::PermissionDenied(err.to_string()),
            opendal::ErrorKind::Unsupported => StoreError::Unsupported(err.to_string()),
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

/// Part size handed to backends that upload in multiple parts.
pub const WRITE_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Access level applied to a newly written object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Visibility::Private => write!(f, "private"),
            Visibility::Public => write!(f, "public"),
        }
    }
}

/// Per-object options for a write stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    pub visibility: Visibility,
    pub content_type: String,
}

/// Remote object metadata consulted by the existence check.
#[derive(Debug, Clone, Default)]
pub struct ObjectMetadata {
    /// Stored content MD5, if the backend exposes one.
    pub content_md5: Option<Fingerprint>,
}

/// Streaming sink for one object.
///
/// Callers finish with exactly one of `close` or `abort`.
#[async_trait]
pub trait ObjectWriter: Send {
    /// Append a chunk of bytes
    async fn write(&mut self, chunk: Bytes) -> Result<(), StoreError>;

    /// Commit the object
    async fn close(&mut self) -> Result<(), StoreError>;

    /// Discard everything written so far
    async fn abort(&mut self) -> Result<(), StoreError>;
}

/// Object store trait consumed by the uploader
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch metadata for `key`. Absent objects yield [`StoreError::NotFound`].
    async fn metadata(&self, key: &str) -> Result<ObjectMetadata, StoreError>;

    /// Open a write stream for `key`
    async fn open_writer(
        &self,
        key: &str,
        options: &WriteOptions,
    ) -> Result<Box<dyn ObjectWriter>, StoreError>;

    /// Get the backend type
    fn backend_type(&self) -> BackendType;

    /// Get display path for a key
    fn display_path(&self, key: &str) -> String {
        key.to_string()
    }
}

/// Handle bound to one key in a store. The object may or may not exist.
#[derive(Clone)]
pub struct ObjectRef {
    store: Arc<dyn ObjectStore>,
    key: String,
}

impl ObjectRef {
    pub fn new(store: Arc<dyn ObjectStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn metadata(&self) -> Result<ObjectMetadata, StoreError> {
        self.store.metadata(&self.key).await
    }

    pub async fn open_writer(
        &self,
        options: &WriteOptions,
    ) -> Result<Box<dyn ObjectWriter>, StoreError> {
        self.store.open_writer(&self.key, options).await
    }

    pub fn display_path(&self) -> String {
        self.store.display_path(&self.key)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("backend", &self.store.backend_type().short_name())
            .field("key", &self.key)
            .finish()
    }
}

/// Normalize a destination key: forward slashes, no leading `/` or `./`.
pub fn normalize_key(key: &str) -> String {
    key.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

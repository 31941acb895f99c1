//! Uploader configuration.
//!
//! Loaded from TOML, then overridden by command-line flags. Immutable for
//! the duration of a run.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::SyncError;
use crate::store::{GcsStore, ObjectStore, S3Store, Visibility};
use crate::sync::filter::FilterSet;

/// Region used for S3 when none is configured.
pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// Which object store to upload into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Gcs,
    S3,
}

/// How to authenticate against the store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    /// Ambient credential chain of the backend.
    #[default]
    Default,
    /// GCS service account JSON on disk.
    ServiceAccountFile { path: PathBuf },
    /// GCS service account JSON inline.
    ServiceAccountJson { json: String },
    /// S3 access key pair.
    AccessKey {
        access_key_id: String,
        secret_access_key: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UploaderConfig {
    pub backend: BackendKind,
    pub bucket: String,
    pub credentials: Credentials,
    /// Make uploaded objects publicly readable.
    pub public: bool,
    /// Verbose per-file logging.
    pub debug: bool,
    pub allow: Vec<String>,
    pub disallow: Vec<String>,
    /// Maximum transfers in flight. 1 uploads strictly one file at a time.
    pub concurrency: usize,
    /// Custom service endpoint (emulators, S3-compatible providers).
    pub endpoint: Option<String>,
    /// S3 region.
    pub region: Option<String>,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Gcs,
            bucket: String::new(),
            credentials: Credentials::Default,
            public: false,
            debug: false,
            allow: Vec::new(),
            disallow: Vec::new(),
            concurrency: 1,
            endpoint: None,
            region: None,
        }
    }
}

impl UploaderConfig {
    /// Per-user config location, e.g. `~/.config/bucketsync/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bucketsync").join("config.toml"))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, SyncError> {
        toml::from_str(content).map_err(|e| SyncError::config(e.to_string()))
    }

    /// Load from an explicit file.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SyncError::io(e, "reading config", path))?;
        Self::from_toml_str(&content)
    }

    /// Load the per-user config, falling back to defaults when it does not exist.
    pub fn load_default() -> Result<Self, SyncError> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn visibility(&self) -> Visibility {
        if self.public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }

    /// Compile the allow/disallow patterns.
    pub fn filter(&self) -> Result<FilterSet, SyncError> {
        FilterSet::new(&self.allow, &self.disallow)
    }

    /// Check everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.bucket.trim().is_empty() {
            return Err(SyncError::config("bucket is required"));
        }
        if self.concurrency == 0 {
            return Err(SyncError::config("concurrency must be at least 1"));
        }

        match (self.backend, &self.credentials) {
            (BackendKind::Gcs, Credentials::AccessKey { .. }) => {
                return Err(SyncError::config("access key credentials require the s3 backend"));
            }
            (BackendKind::S3, Credentials::ServiceAccountFile { .. })
            | (BackendKind::S3, Credentials::ServiceAccountJson { .. }) => {
                return Err(SyncError::config("service account credentials require the gcs backend"));
            }
            _ => {}
        }

        if self.backend == BackendKind::S3 && self.public {
            return Err(SyncError::config(
                "public uploads are not supported on s3; grant access with a bucket policy",
            ));
        }

        self.filter().map(|_| ())
    }

    /// Build the object store client described by this config.
    pub fn build_store(&self) -> Result<Arc<dyn ObjectStore>, SyncError> {
        let bucket = self.bucket.as_str();
        let endpoint = self.endpoint.as_deref();
        let region = self.region.as_deref().unwrap_or(DEFAULT_S3_REGION);

        let store: Arc<dyn ObjectStore> = match (self.backend, &self.credentials) {
            (BackendKind::Gcs, Credentials::ServiceAccountFile { path }) => Arc::new(
                GcsStore::from_service_account(bucket, &path.to_string_lossy(), endpoint)
                    .map_err(|e| SyncError::config(format!("{:#}", e)))?,
            ),
            (BackendKind::Gcs, Credentials::ServiceAccountJson { json }) => Arc::new(
                GcsStore::new(bucket, Some(json), endpoint)
                    .map_err(|e| SyncError::config(format!("{:#}", e)))?,
            ),
            (BackendKind::Gcs, _) => Arc::new(
                GcsStore::new(bucket, None, endpoint)
                    .map_err(|e| SyncError::config(format!("{:#}", e)))?,
            ),
            (BackendKind::S3, Credentials::AccessKey { access_key_id, secret_access_key }) => {
                Arc::new(
                    S3Store::new(bucket, region, access_key_id, secret_access_key, endpoint)
                        .map_err(|e| SyncError::config(format!("{:#}", e)))?,
                )
            }
            (BackendKind::S3, _) => Arc::new(
                S3Store::new_with_iam(bucket, region, endpoint)
                    .map_err(|e| SyncError::config(format!("{:#}", e)))?,
            ),
        };

        Ok(store)
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use bytes::Bytes;
use opendal::{services::Gcs, Operator, Writer};

use crate::store::backend::{
    BackendType, ObjectMetadata, ObjectStore, ObjectWriter, StoreError, Visibility, WriteOptions,
    WRITE_CHUNK_SIZE,
};
use crate::sync::hash::Fingerprint;

/// Predefined ACL applied to objects written with [`Visibility::Public`].
const PUBLIC_ACL: &str = "publicRead";

/// Google Cloud Storage backend using OpenDAL
///
/// Holds one operator per visibility since GCS takes the predefined ACL
/// at the service level.
pub struct GcsStore {
    private: Operator,
    public: Operator,
    bucket: String,
}

impl GcsStore {
    /// Create a new GCS backend
    ///
    /// `credential` is the service account JSON. Without it the standard
    /// Google credential chain is used:
    /// 1. GOOGLE_APPLICATION_CREDENTIALS env var
    /// 2. Well-known credentials file (~/.config/gcloud)
    /// 3. GCE metadata server / GKE Workload Identity
    pub fn new(bucket: &str, credential: Option<&str>, endpoint: Option<&str>) -> Result<Self> {
        let private = Self::operator(bucket, credential, endpoint, None)?;
        let public = Self::operator(bucket, credential, endpoint, Some(PUBLIC_ACL))?;

        Ok(Self {
            private,
            public,
            bucket: bucket.to_string(),
        })
    }

    /// Create GCS backend using service account JSON file
    pub fn from_service_account(
        bucket: &str,
        service_account_path: &str,
        endpoint: Option<&str>,
    ) -> Result<Self> {
        let credential = std::fs::read_to_string(service_account_path)
            .with_context(|| format!("Failed to read service account file {}", service_account_path))?;

        Self::new(bucket, Some(&credential), endpoint)
    }

    fn operator(
        bucket: &str,
        credential: Option<&str>,
        endpoint: Option<&str>,
        predefined_acl: Option<&str>,
    ) -> Result<Operator> {
        let mut builder = Gcs::default().bucket(bucket);

        // OpenDAL expects the credential JSON base64 encoded
        if let Some(cred) = credential {
            let encoded = base64::engine::general_purpose::STANDARD.encode(cred);
            builder = builder.credential(&encoded);
        }

        if let Some(endpoint) = endpoint {
            builder = builder.endpoint(endpoint);
        }

        if let Some(acl) = predefined_acl {
            builder = builder.predefined_acl(acl);
        }

        let operator = Operator::new(builder)
            .context("Failed to configure GCS backend")?
            .finish();

        Ok(operator)
    }

    fn operator_for(&self, visibility: Visibility) -> &Operator {
        match visibility {
            Visibility::Private => &self.private,
            Visibility::Public => &self.public,
        }
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn metadata(&self, key: &str) -> Result<ObjectMetadata, StoreError> {
        let key = key.trim_start_matches('/');
        let meta = self.private.stat(key).await?;

        // GCS reports md5Hash as base64 already; composite objects have none
        let content_md5 = meta
            .content_md5()
            .map(|md5| Fingerprint::from_base64(md5.to_string()));

        Ok(ObjectMetadata { content_md5 })
    }

    async fn open_writer(
        &self,
        key: &str,
        options: &WriteOptions,
    ) -> Result<Box<dyn ObjectWriter>, StoreError> {
        let key = key.trim_start_matches('/');
        let writer = self
            .operator_for(options.visibility)
            .writer_with(key)
            .content_type(&options.content_type)
            .chunk(WRITE_CHUNK_SIZE)
            .await?;

        Ok(Box::new(OpendalWriter { inner: writer }))
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Gcs {
            bucket: self.bucket.clone(),
        }
    }

    fn display_path(&self, key: &str) -> String {
        format!("gs://{}/{}", self.bucket, key.trim_start_matches('/'))
    }
}

/// Adapter from an OpenDAL writer to [`ObjectWriter`], shared with the S3 backend.
pub(crate) struct OpendalWriter {
    pub(crate) inner: Writer,
}

#[async_trait]
impl ObjectWriter for OpendalWriter {
    async fn write(&mut self, chunk: Bytes) -> Result<(), StoreError> {
        self.inner.write(chunk).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.inner.close().await?;
        Ok(())
    }

    async fn abort(&mut self) -> Result<(), StoreError> {
        self.inner.abort().await?;
        Ok(())
    }
}

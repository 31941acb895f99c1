use anyhow::{Context, Result};
use async_trait::async_trait;
use opendal::{services::S3, Operator};

use crate::store::backend::{
    BackendType, ObjectMetadata, ObjectStore, ObjectWriter, StoreError, Visibility, WriteOptions,
    WRITE_CHUNK_SIZE,
};
use crate::store::gcs::OpendalWriter;
use crate::sync::hash::Fingerprint;

/// S3 and S3-compatible storage backend using OpenDAL
pub struct S3Store {
    operator: Operator,
    bucket: String,
    region: String,
}

impl S3Store {
    /// Create a new S3 backend with explicit credentials
    pub fn new(
        bucket: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        endpoint: Option<&str>,
    ) -> Result<Self> {
        let mut builder = S3::default()
            .bucket(bucket)
            .region(region)
            .access_key_id(access_key)
            .secret_access_key(secret_key);

        // Set custom endpoint for S3-compatible providers
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint(endpoint);
        }

        let operator = Operator::new(builder)
            .context("Failed to configure S3 backend")?
            .finish();

        Ok(Self {
            operator,
            bucket: bucket.to_string(),
            region: region.to_string(),
        })
    }

    /// Create a new S3 backend using the ambient AWS credential chain
    ///
    /// 1. Environment variables (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY)
    /// 2. Shared credentials file (~/.aws/credentials)
    /// 3. EC2 Instance Profile / ECS Task Role / EKS Pod Identity
    pub fn new_with_iam(bucket: &str, region: &str, endpoint: Option<&str>) -> Result<Self> {
        let mut builder = S3::default().bucket(bucket).region(region);

        if let Some(endpoint) = endpoint {
            builder = builder.endpoint(endpoint);
        }

        let operator = Operator::new(builder)
            .context("Failed to configure S3 backend")?
            .finish();

        Ok(Self {
            operator,
            bucket: bucket.to_string(),
            region: region.to_string(),
        })
    }
}

/// Recover the content MD5 from an S3 ETag.
///
/// Single-part uploads carry the hex MD5 as their ETag. Multipart ETags
/// (`<hex>-<parts>`) are not content hashes and yield `None`.
pub fn md5_from_etag(etag: &str) -> Option<Fingerprint> {
    let etag = etag.trim_start_matches("W/").trim_matches('"');
    if etag.contains('-') {
        return None;
    }
    Fingerprint::from_hex(etag)
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn metadata(&self, key: &str) -> Result<ObjectMetadata, StoreError> {
        let key = key.trim_start_matches('/');
        let meta = self.operator.stat(key).await?;

        let content_md5 = meta
            .content_md5()
            .map(|md5| Fingerprint::from_base64(md5.to_string()))
            .or_else(|| meta.etag().and_then(md5_from_etag));

        Ok(ObjectMetadata { content_md5 })
    }

    async fn open_writer(
        &self,
        key: &str,
        options: &WriteOptions,
    ) -> Result<Box<dyn ObjectWriter>, StoreError> {
        if options.visibility == Visibility::Public {
            return Err(StoreError::Unsupported(
                "public-read ACL on S3 objects; use a bucket policy instead".to_string(),
            ));
        }

        let key = key.trim_start_matches('/');
        let writer = self
            .operator
            .writer_with(key)
            .content_type(&options.content_type)
            .chunk(WRITE_CHUNK_SIZE)
            .await?;

        Ok(Box::new(OpendalWriter { inner: writer }))
    }

    fn backend_type(&self) -> BackendType {
        BackendType::S3 {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
        }
    }

    fn display_path(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key.trim_start_matches('/'))
    }
}

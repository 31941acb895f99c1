//! Content fingerprints for change detection.
//!
//! Uses MD5 encoded as base64, the same form GCS reports as `md5Hash`,
//! so a local fingerprint compares directly against remote metadata.

use base64::Engine as _;
use md5::{Digest, Md5};
use std::fmt;
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::error::SyncError;

/// Read buffer size for streaming hashes.
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// MD5 digest length in bytes.
const MD5_LEN: usize = 16;

/// A file's content fingerprint.
///
/// Only ever compared for equality; two fingerprints are equal exactly when
/// their encoded text is equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Encode a raw digest.
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(base64::engine::general_purpose::STANDARD.encode(digest))
    }

    /// Wrap an already base64-encoded digest as reported by a store.
    pub fn from_base64(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Parse a hex MD5 digest (e.g. an S3 ETag).
    pub fn from_hex(hex_digest: &str) -> Option<Self> {
        let bytes = hex::decode(hex_digest).ok()?;
        if bytes.len() != MD5_LEN {
            return None;
        }
        Some(Self::from_digest(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint in-memory data.
pub fn fingerprint_bytes(data: &[u8]) -> Fingerprint {
    Fingerprint::from_digest(&Md5::digest(data))
}

/// Fingerprint a file by streaming it through the hasher.
///
/// The file is never loaded whole; the handle is dropped on every return path.
pub async fn fingerprint(path: &Path) -> Result<Fingerprint, SyncError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| SyncError::io(e, "opening", path))?;

    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .await
            .map_err(|e| SyncError::io(e, "hashing", path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Fingerprint::from_digest(&hasher.finalize()))
}

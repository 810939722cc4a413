//! Blob storage for attachments.
//!
//! Every blob is addressed by a `/`-separated pathname and served from a
//! public URL. Three backends:
//! - `local`: files under a directory, served by the app itself at `/blobs`
//! - `memory`: process-local map, for tests and throwaway runs
//! - `remote`: a Vercel-Blob-compatible HTTP API

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use thiserror::Error;

use bridal_core::config::{StorageBackend, StorageConfig};

pub mod local;
pub mod memory;
pub mod remote;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;
pub use remote::RemoteBlobStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobObject {
    pub pathname: String,
    pub url: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

impl BlobObject {
    /// Last pathname segment.
    pub fn file_name(&self) -> &str {
        self.pathname.rsplit('/').next().unwrap_or(&self.pathname)
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("invalid blob path `{0}`")]
    InvalidPath(String),
    #[error("blob io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("blob request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("blob api returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("storage is misconfigured: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Blobs whose pathname starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<BlobObject>, StorageError>;

    async fn put(
        &self,
        pathname: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<BlobObject, StorageError>;

    async fn download(&self, url: &str) -> Result<Vec<u8>, StorageError>;

    async fn delete(&self, url: &str) -> Result<(), StorageError>;
}

pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn BlobStore>, StorageError> {
    match config.backend {
        StorageBackend::Local => Ok(Arc::new(LocalBlobStore::new(
            config.local_root.clone(),
            config.public_base_url.clone(),
        ))),
        StorageBackend::Memory => Ok(Arc::new(MemoryBlobStore::new(config.public_base_url.clone()))),
        StorageBackend::Remote => {
            let token = config
                .remote_token
                .as_ref()
                .map(|token| token.expose_secret().to_string())
                .ok_or_else(|| StorageError::Configuration("remote_token is not set".to_string()))?;
            Ok(Arc::new(RemoteBlobStore::new(config.remote_api_url.clone(), token)))
        }
    }
}

/// Rejects empty, absolute and parent-relative pathnames.
pub(crate) fn validate_pathname(pathname: &str) -> Result<(), StorageError> {
    let bad = pathname.is_empty()
        || pathname.starts_with('/')
        || pathname.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad {
        return Err(StorageError::InvalidPath(pathname.to_string()));
    }
    Ok(())
}

/// Public URL of `pathname` under `base_url`, one percent-encoded segment at
/// a time.
pub(crate) fn public_url(base_url: &str, pathname: &str) -> String {
    let encoded: Vec<String> =
        pathname.split('/').map(|segment| urlencoding::encode(segment).into_owned()).collect();
    format!("{}/{}", base_url.trim_end_matches('/'), encoded.join("/"))
}

/// Inverse of [`public_url`]; `None` for URLs outside `base_url`.
pub(crate) fn pathname_for(base_url: &str, url: &str) -> Option<String> {
    let base = base_url.trim_end_matches('/');
    let rest = url.strip_prefix(base)?.strip_prefix('/')?;
    let rest = rest.split(|c| c == '?' || c == '#').next().unwrap_or(rest);
    let decoded: Vec<String> = rest
        .split('/')
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|segment| segment.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        })
        .collect();
    Some(decoded.join("/"))
}

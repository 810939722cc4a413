use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{pathname_for, public_url, validate_pathname, BlobObject, BlobStore, StorageError};

struct StoredBlob {
    bytes: Vec<u8>,
    uploaded_at: DateTime<Utc>,
}

/// Keeps blobs in process memory. Contents vanish with the process.
pub struct MemoryBlobStore {
    base_url: String,
    blobs: RwLock<BTreeMap<String, StoredBlob>>,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), blobs: RwLock::new(BTreeMap::new()) }
    }

    #[cfg(test)]
    pub async fn contains(&self, pathname: &str) -> bool {
        self.blobs.read().await.contains_key(pathname)
    }

    #[cfg(test)]
    pub async fn pathnames(&self) -> Vec<String> {
        self.blobs.read().await.keys().cloned().collect()
    }

    fn resolve(&self, url: &str) -> Result<String, StorageError> {
        pathname_for(&self.base_url, url).ok_or_else(|| StorageError::NotFound(url.to_string()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list(&self, prefix: &str) -> Result<Vec<BlobObject>, StorageError> {
        let blobs = self.blobs.read().await;
        Ok(blobs
            .range(prefix.to_string()..)
            .take_while(|(pathname, _)| pathname.starts_with(prefix))
            .map(|(pathname, blob)| BlobObject {
                pathname: pathname.clone(),
                url: public_url(&self.base_url, pathname),
                size: blob.bytes.len() as u64,
                uploaded_at: blob.uploaded_at,
            })
            .collect())
    }

    async fn put(
        &self,
        pathname: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<BlobObject, StorageError> {
        validate_pathname(pathname)?;
        let uploaded_at = Utc::now();
        let size = bytes.len() as u64;
        self.blobs.write().await.insert(pathname.to_string(), StoredBlob { bytes, uploaded_at });

        Ok(BlobObject {
            pathname: pathname.to_string(),
            url: public_url(&self.base_url, pathname),
            size,
            uploaded_at,
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        let pathname = self.resolve(url)?;
        let blobs = self.blobs.read().await;
        blobs
            .get(&pathname)
            .map(|blob| blob.bytes.clone())
            .ok_or_else(|| StorageError::NotFound(url.to_string()))
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let pathname = self.resolve(url)?;
        match self.blobs.write().await.remove(&pathname) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(url.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryBlobStore;
    use crate::storage::{BlobStore, StorageError};

    #[tokio::test]
    async fn list_is_scoped_to_prefix() {
        let store = MemoryBlobStore::new("http://blobs.test");
        store.put("approvals/1-a.pdf", b"a".to_vec(), "application/pdf").await.expect("put");
        store.put("approvals/2-b.jpg", b"bb".to_vec(), "image/jpeg").await.expect("put");
        store.put("costs/documents/3-c.pdf", b"c".to_vec(), "application/pdf").await.expect("put");

        let listed = store.list("approvals/").await.expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].file_name(), "2-b.jpg");
        assert_eq!(listed[1].size, 2);
    }

    #[tokio::test]
    async fn delete_and_download_use_public_urls() {
        let store = MemoryBlobStore::new("http://blobs.test");
        let blob = store.put("approvals/robe ivoire.jpg", b"img".to_vec(), "image/jpeg").await.expect("put");
        assert_eq!(blob.url, "http://blobs.test/approvals/robe%20ivoire.jpg");

        assert_eq!(store.download(&blob.url).await.expect("download"), b"img".to_vec());
        store.delete(&blob.url).await.expect("delete");
        assert!(matches!(store.download(&blob.url).await, Err(StorageError::NotFound(_))));
    }
}

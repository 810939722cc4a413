use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;

use super::{pathname_for, public_url, validate_pathname, BlobObject, BlobStore, StorageError};

/// Stores blobs as files under `root`. The server exposes `root` at the
/// configured public base URL.
pub struct LocalBlobStore {
    root: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self { root: root.into(), base_url: base_url.into() }
    }

    fn path_of(&self, pathname: &str) -> Result<PathBuf, StorageError> {
        validate_pathname(pathname)?;
        Ok(pathname.split('/').fold(self.root.clone(), |path, segment| path.join(segment)))
    }

    fn resolve(&self, url: &str) -> Result<PathBuf, StorageError> {
        let pathname =
            pathname_for(&self.base_url, url).ok_or_else(|| StorageError::NotFound(url.to_string()))?;
        self.path_of(&pathname)
    }

    async fn describe(&self, pathname: String, path: &Path) -> Result<BlobObject, StorageError> {
        let metadata = fs::metadata(path).await?;
        let uploaded_at = metadata.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now());
        Ok(BlobObject {
            url: public_url(&self.base_url, &pathname),
            pathname,
            size: metadata.len(),
            uploaded_at,
        })
    }
}

fn not_found_or_io(error: std::io::Error, url: &str) -> StorageError {
    if error.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(url.to_string())
    } else {
        StorageError::Io(error)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn list(&self, prefix: &str) -> Result<Vec<BlobObject>, StorageError> {
        let mut found = Vec::new();
        let mut pending = vec![(self.root.clone(), String::new())];

        while let Some((dir, relative)) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => continue,
                Err(error) => return Err(error.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let pathname =
                    if relative.is_empty() { name } else { format!("{relative}/{name}") };

                if entry.file_type().await?.is_dir() {
                    let subtree = format!("{pathname}/");
                    if subtree.starts_with(prefix) || prefix.starts_with(&subtree) {
                        pending.push((entry.path(), pathname));
                    }
                } else if pathname.starts_with(prefix) {
                    found.push(self.describe(pathname, &entry.path()).await?);
                }
            }
        }

        found.sort_by(|a, b| a.pathname.cmp(&b.pathname));
        Ok(found)
    }

    async fn put(
        &self,
        pathname: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<BlobObject, StorageError> {
        let path = self.path_of(pathname)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &bytes).await?;
        self.describe(pathname.to_string(), &path).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(url)?;
        fs::read(&path).await.map_err(|error| not_found_or_io(error, url))
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let path = self.resolve(url)?;
        fs::remove_file(&path).await.map_err(|error| not_found_or_io(error, url))
    }
}

#[cfg(test)]
mod tests {
    use super::LocalBlobStore;
    use crate::storage::{BlobStore, StorageError};

    #[tokio::test]
    async fn files_land_under_root_and_list_by_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalBlobStore::new(dir.path(), "http://127.0.0.1:8080/blobs");

        let blob = store
            .put("approvals/17-facture mai.pdf", b"%PDF".to_vec(), "application/pdf")
            .await
            .expect("put");
        store.put("payments/images/18-recu.jpg", b"jpg".to_vec(), "image/jpeg").await.expect("put");

        assert!(dir.path().join("approvals").join("17-facture mai.pdf").exists());
        assert_eq!(blob.url, "http://127.0.0.1:8080/blobs/approvals/17-facture%20mai.pdf");

        let listed = store.list("approvals/").await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].pathname, "approvals/17-facture mai.pdf");
        assert_eq!(listed[0].size, 4);
    }

    #[tokio::test]
    async fn listing_a_missing_prefix_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalBlobStore::new(dir.path().join("never-created"), "http://local/blobs");
        assert!(store.list("approvals/").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn delete_removes_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalBlobStore::new(dir.path(), "http://local/blobs");
        let blob = store.put("approvals/a.txt", b"a".to_vec(), "text/plain").await.expect("put");

        store.delete(&blob.url).await.expect("delete");
        assert!(matches!(store.delete(&blob.url).await, Err(StorageError::NotFound(_))));
        assert!(matches!(
            store.put("../escape.txt", Vec::new(), "text/plain").await,
            Err(StorageError::InvalidPath(_))
        ));
    }
}

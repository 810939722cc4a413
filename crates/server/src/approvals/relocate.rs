use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use bridal_core::domain::attachment::{
    content_type_for, decode_file_name, Attachment, FileCategory,
};
use bridal_core::domain::resource::ResourceKind;

use crate::storage::{BlobObject, BlobStore, StorageError};

/// Moves attachments uploaded for a pending approval out of the temporary
/// approvals area and into the owning resource's folder.
#[derive(Clone)]
pub struct AttachmentRelocator {
    blobs: Arc<dyn BlobStore>,
    prefix: String,
}

impl AttachmentRelocator {
    pub fn new(blobs: Arc<dyn BlobStore>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        Self { blobs, prefix }
    }

    fn is_staged(&self, url: &str) -> bool {
        url.contains(&format!("/{}/", self.prefix))
    }

    /// Relocates every staged attachment in order. Attachments outside the
    /// approvals area come back untouched; a failed move keeps the original
    /// reference.
    pub async fn relocate(
        &self,
        kind: ResourceKind,
        attachments: Vec<Attachment>,
        correlation_id: &str,
    ) -> Vec<Attachment> {
        let mut staged: Option<Vec<BlobObject>> = None;
        let mut relocated = Vec::with_capacity(attachments.len());

        for attachment in attachments {
            if !self.is_staged(&attachment.url) {
                relocated.push(attachment);
                continue;
            }

            if staged.is_none() {
                staged = Some(self.blobs.list(&format!("{}/", self.prefix)).await.unwrap_or_else(
                    |error| {
                        warn!(
                            event_name = "approval.relocate.list_failed",
                            correlation_id,
                            error = %error,
                            "could not list staged uploads"
                        );
                        Vec::new()
                    },
                ));
            }
            let candidates = staged.as_deref().unwrap_or_default();

            match self.move_one(kind, &attachment, candidates).await {
                Ok(moved) => relocated.push(moved),
                Err(error) => {
                    warn!(
                        event_name = "approval.relocate.failed",
                        correlation_id,
                        resource_type = %kind,
                        url = %attachment.url,
                        error = %error,
                        "keeping original attachment reference"
                    );
                    let mut kept = attachment;
                    kept.backfill(Utc::now());
                    relocated.push(kept);
                }
            }
        }

        relocated
    }

    async fn move_one(
        &self,
        kind: ResourceKind,
        attachment: &Attachment,
        candidates: &[BlobObject],
    ) -> Result<Attachment, StorageError> {
        let encoded = attachment.url_file_name();
        let decoded = decode_file_name(encoded);
        let source = candidates
            .iter()
            .find(|blob| {
                blob.url == attachment.url
                    || blob.file_name() == encoded
                    || blob.file_name() == decoded
            })
            .ok_or_else(|| StorageError::NotFound(attachment.url.clone()))?;

        let bytes = self.blobs.download(&source.url).await?;
        let file_name = decode_file_name(source.file_name());
        let destination = format!(
            "{}/{}/{}-{}",
            kind.storage_folder(),
            FileCategory::from_file_name(&file_name).folder(),
            Utc::now().timestamp_millis(),
            file_name
        );
        let stored = self.blobs.put(&destination, bytes, content_type_for(&file_name)).await?;

        if let Err(error) = self.blobs.delete(&source.url).await {
            warn!(
                event_name = "approval.relocate.cleanup_failed",
                url = %source.url,
                error = %error,
                "staged upload could not be deleted"
            );
        }

        info!(
            event_name = "approval.relocate.moved",
            resource_type = %kind,
            from = %source.pathname,
            to = %stored.pathname,
            "attachment relocated"
        );

        let mut moved = attachment.clone();
        if moved.name.trim().is_empty() {
            moved.name = file_name;
        }
        moved.rewrite_url(stored.url);
        moved.size = stored.size;
        moved.backfill(Utc::now());
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bridal_core::domain::attachment::Attachment;
    use bridal_core::domain::resource::ResourceKind;

    use super::AttachmentRelocator;
    use crate::storage::{BlobStore, MemoryBlobStore};

    const BASE: &str = "http://blobs.test";

    fn relocator() -> (Arc<MemoryBlobStore>, AttachmentRelocator) {
        let store = Arc::new(MemoryBlobStore::new(BASE));
        let relocator = AttachmentRelocator::new(store.clone(), "approvals");
        (store, relocator)
    }

    #[tokio::test]
    async fn attachments_outside_the_approvals_area_are_untouched() {
        let (store, relocator) = relocator();
        let already_placed = Attachment {
            url: format!("{BASE}/costs/documents/1-facture.pdf"),
            ..Attachment::default()
        };

        let result =
            relocator.relocate(ResourceKind::Cost, vec![already_placed.clone()], "req").await;

        assert_eq!(result, vec![already_placed]);
        assert!(store.pathnames().await.is_empty());
    }

    #[tokio::test]
    async fn staged_upload_moves_into_the_resource_folder() {
        let (store, relocator) = relocator();
        let staged = store
            .put("approvals/17-reçu mai.pdf", b"%PDF-1.7".to_vec(), "application/pdf")
            .await
            .expect("stage");

        let result = relocator
            .relocate(
                ResourceKind::Cost,
                vec![Attachment {
                    url: staged.url.clone(),
                    link: Some(staged.url.clone()),
                    ..Attachment::default()
                }],
                "req",
            )
            .await;

        let moved = &result[0];
        assert!(moved.url.starts_with(&format!("{BASE}/costs/documents/")));
        assert!(moved.url.ends_with("-17-re%C3%A7u%20mai.pdf"));
        assert_eq!(moved.link.as_deref(), Some(moved.url.as_str()));
        assert_eq!(moved.size, 8);
        assert_eq!(moved.content_type, "application/pdf");
        assert_eq!(moved.name, "17-reçu mai.pdf");
        assert!(moved.uploaded_at.is_some());
        assert!(!store.contains("approvals/17-reçu mai.pdf").await);
    }

    #[tokio::test]
    async fn images_go_to_the_images_folder() {
        let (store, relocator) = relocator();
        let staged =
            store.put("approvals/robe.jpg", b"jpg".to_vec(), "image/jpeg").await.expect("stage");

        let result = relocator
            .relocate(
                ResourceKind::Item,
                vec![Attachment { url: staged.url, ..Attachment::default() }],
                "req",
            )
            .await;

        assert!(result[0].url.starts_with(&format!("{BASE}/products/images/")));
    }

    #[tokio::test]
    async fn missing_staged_blob_keeps_reference_with_backfill() {
        let (_store, relocator) = relocator();
        let missing = Attachment {
            url: format!("{BASE}/approvals/ghost.pdf"),
            ..Attachment::default()
        };

        let result = relocator.relocate(ResourceKind::Payment, vec![missing.clone()], "req").await;

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].url, missing.url);
        assert_eq!(result[0].name, "ghost.pdf");
        assert_eq!(result[0].content_type, "application/pdf");
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let (store, relocator) = relocator();
        let staged =
            store.put("approvals/ok.png", b"png".to_vec(), "image/png").await.expect("stage");

        let result = relocator
            .relocate(
                ResourceKind::Reservation,
                vec![
                    Attachment { url: format!("{BASE}/approvals/ghost.pdf"), ..Attachment::default() },
                    Attachment { url: staged.url, ..Attachment::default() },
                ],
                "req",
            )
            .await;

        assert_eq!(result.len(), 2);
        assert!(result[0].url.ends_with("/approvals/ghost.pdf"));
        assert!(result[1].url.starts_with(&format!("{BASE}/reservations/images/")));
    }
}

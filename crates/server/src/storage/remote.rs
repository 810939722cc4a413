use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{validate_pathname, BlobObject, BlobStore, StorageError};

const API_VERSION: &str = "7";

/// Client for a Vercel-Blob-compatible REST API.
pub struct RemoteBlobStore {
    client: Client,
    api_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteBlob {
    url: String,
    pathname: String,
    #[serde(default)]
    size: u64,
    uploaded_at: Option<DateTime<Utc>>,
}

impl From<RemoteBlob> for BlobObject {
    fn from(blob: RemoteBlob) -> Self {
        Self {
            url: blob.url,
            pathname: blob.pathname,
            size: blob.size,
            uploaded_at: blob.uploaded_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    blobs: Vec<RemoteBlob>,
    cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

impl RemoteBlobStore {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.token).header("x-api-version", API_VERSION)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(
        event_name = "storage.remote.request_failed",
        status = status.as_u16(),
        body = %body,
        "blob api request failed"
    );
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(StorageError::NotFound(body));
    }
    Err(StorageError::Status { status: status.as_u16(), body })
}

#[async_trait]
impl BlobStore for RemoteBlobStore {
    async fn list(&self, prefix: &str) -> Result<Vec<BlobObject>, StorageError> {
        let mut blobs = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("prefix", prefix.to_string())];
            if let Some(cursor) = &cursor {
                query.push(("cursor", cursor.clone()));
            }

            let response =
                self.authorized(self.client.get(&self.api_url).query(&query)).send().await?;
            let page: ListPage = ensure_success(response).await?.json().await?;
            debug!(
                event_name = "storage.remote.list_page",
                prefix,
                count = page.blobs.len(),
                has_more = page.has_more,
                "listed blob page"
            );

            blobs.extend(page.blobs.into_iter().map(BlobObject::from));
            match page.cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }

        Ok(blobs)
    }

    async fn put(
        &self,
        pathname: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<BlobObject, StorageError> {
        validate_pathname(pathname)?;
        let size = bytes.len() as u64;
        let encoded: Vec<String> =
            pathname.split('/').map(|segment| urlencoding::encode(segment).into_owned()).collect();
        let url = format!("{}/{}", self.api_url, encoded.join("/"));

        let response = self
            .authorized(self.client.put(url))
            .header("x-content-type", content_type)
            .header("x-add-random-suffix", "0")
            .body(bytes)
            .send()
            .await?;
        let mut blob: RemoteBlob = ensure_success(response).await?.json().await?;
        if blob.size == 0 {
            blob.size = size;
        }
        Ok(blob.into())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.client.get(url).send().await?;
        let bytes = ensure_success(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let response = self
            .authorized(self.client.post(format!("{}/delete", self.api_url)))
            .json(&serde_json::json!({ "urls": [url] }))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

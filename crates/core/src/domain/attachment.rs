use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file attached to a resource, stored in the blob store and referenced by
/// its public URL.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    pub url: String,
    #[serde(rename = "type", default)]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileCategory {
    Image,
    Document,
}

impl FileCategory {
    pub fn from_file_name(name: &str) -> Self {
        if content_type_for(name).starts_with("image/") {
            Self::Image
        } else {
            Self::Document
        }
    }

    pub fn folder(self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Document => "documents",
        }
    }
}

impl Attachment {
    /// File name as it appears in the last segment of the URL, without query.
    pub fn url_file_name(&self) -> &str {
        file_name_of(&self.url)
    }

    /// Fills in whatever metadata the uploader did not provide.
    pub fn backfill(&mut self, now: DateTime<Utc>) {
        if self.name.trim().is_empty() {
            self.name = decode_file_name(file_name_of(&self.url));
        }
        if self.content_type.trim().is_empty() {
            self.content_type = content_type_for(&self.name).to_string();
        }
        if self.uploaded_at.is_none() {
            self.uploaded_at = Some(now);
        }
    }

    /// Points the attachment at a new location, keeping `link` in sync when
    /// the client sent one.
    pub fn rewrite_url(&mut self, url: String) {
        if self.link.is_some() {
            self.link = Some(url.clone());
        }
        self.url = url;
    }
}

pub fn file_name_of(url: &str) -> &str {
    let without_query = url.split(|c| c == '?' || c == '#').next().unwrap_or(url);
    without_query.rsplit('/').next().unwrap_or(without_query)
}

/// Percent-decodes a URL path segment; undecodable input is returned as-is.
pub fn decode_file_name(raw: &str) -> String {
    urlencoding::decode(raw).map(|decoded| decoded.into_owned()).unwrap_or_else(|_| raw.to_string())
}

/// MIME type inferred from the file extension.
pub fn content_type_for(name: &str) -> &'static str {
    let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("heic") => "image/heic",
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("txt") => "text/plain",
        Some("csv") => "text/csv",
        _ => "application/octet-stream",
    }
}

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use bridal_core::domain::attachment::{content_type_for, Attachment, FileCategory};
use bridal_core::domain::resource::ResourceKind;

use crate::auth::SessionUser;
use crate::error::{bad_request, domain_error, storage_error, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub resource: String,
    pub filename: String,
}

/// Last path segment with separators and control characters removed.
fn clean_file_name(raw: &str) -> Option<String> {
    let last = raw.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(raw);
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    (!cleaned.is_empty() && cleaned != "." && cleaned != "..").then(|| cleaned.to_string())
}

/// Stores a raw upload. Admin files go straight to the resource's folder;
/// everyone else's wait under the approvals prefix until their request is
/// approved.
pub async fn upload(
    State(state): State<AppState>,
    caller: SessionUser,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Attachment>)> {
    let kind = query.resource.parse::<ResourceKind>().map_err(domain_error)?;
    let file_name =
        clean_file_name(&query.filename).ok_or_else(|| bad_request("filename is required"))?;
    if body.is_empty() {
        return Err(bad_request("upload body is empty"));
    }

    let stamped = format!("{}-{}", Utc::now().timestamp_millis(), file_name);
    let pathname = if caller.user.is_admin() {
        format!(
            "{}/{}/{}",
            kind.storage_folder(),
            FileCategory::from_file_name(&file_name).folder(),
            stamped
        )
    } else {
        format!("{}/{}", state.config.storage.approvals_prefix.trim_matches('/'), stamped)
    };

    let content_type = content_type_for(&file_name);
    let stored = state
        .blobs
        .put(&pathname, body.to_vec(), content_type)
        .await
        .map_err(|error| storage_error(error, &caller.correlation_id))?;

    info!(
        event_name = "upload.stored",
        correlation_id = %caller.correlation_id,
        resource_type = %kind,
        pathname = %stored.pathname,
        size = stored.size,
        "upload stored"
    );

    Ok((
        StatusCode::CREATED,
        Json(Attachment {
            name: file_name,
            size: stored.size,
            url: stored.url,
            content_type: content_type.to_string(),
            uploaded_at: Some(stored.uploaded_at),
            uploaded_by: Some(caller.user.id.0.clone()),
            link: None,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use tower::ServiceExt;

    use super::clean_file_name;
    use crate::routes::router;
    use crate::routes::test_support::{app, json_body, ADMIN_TOKEN, BLOB_BASE, EMPLOYEE_TOKEN};

    fn upload(uri: &str, token: &str, bytes: &'static [u8]) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::COOKIE, format!("session={token}"))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(bytes))
            .expect("request")
    }

    #[test]
    fn file_names_lose_their_directories() {
        assert_eq!(clean_file_name("C:\\scans\\recu.pdf").as_deref(), Some("recu.pdf"));
        assert_eq!(clean_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(clean_file_name("  "), None);
    }

    #[tokio::test]
    async fn employee_uploads_are_staged_under_approvals() {
        let app = app().await;
        let response = router(app.state.clone())
            .oneshot(upload("/api/uploads?resource=payment&filename=recu.jpg", EMPLOYEE_TOKEN, b"jpg"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::CREATED);
        let attachment = json_body(response).await;
        let url = attachment["url"].as_str().expect("url");
        assert!(url.starts_with(&format!("{BLOB_BASE}/approvals/")));
        assert_eq!(attachment["type"], "image/jpeg");
        assert_eq!(attachment["size"], 3);
        assert_eq!(attachment["uploadedBy"], "u-employee");
        assert_eq!(app.blobs.pathnames().await.len(), 1);
    }

    #[tokio::test]
    async fn admin_uploads_go_to_the_resource_folder() {
        let app = app().await;
        let response = router(app.state)
            .oneshot(upload("/api/uploads?resource=cost&filename=facture.pdf", ADMIN_TOKEN, b"%PDF"))
            .await
            .expect("response");

        let attachment = json_body(response).await;
        assert!(attachment["url"]
            .as_str()
            .expect("url")
            .starts_with(&format!("{BLOB_BASE}/costs/documents/")));
    }
}

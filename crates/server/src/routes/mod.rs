use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use bridal_core::config::StorageBackend;
use tower_http::services::ServeDir;

use crate::state::AppState;

pub mod approvals;
pub mod preferences;
pub mod resources;
pub mod uploads;

/// Largest accepted upload body.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/approvals", get(approvals::list).post(approvals::create))
        .route("/api/approvals/{id}", get(approvals::get))
        .route("/api/approvals/{id}/review", put(approvals::review))
        .route("/api/resources/{kind}", get(resources::list).post(resources::create))
        .route(
            "/api/resources/{kind}/{id}",
            get(resources::get).put(resources::update).delete(resources::delete),
        )
        .route(
            "/api/uploads",
            post(uploads::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/api/user-preferences/widgets",
            get(preferences::get_widgets).put(preferences::put_widgets),
        );

    let router = match state.config.storage.backend {
        StorageBackend::Local => {
            api.nest_service("/blobs", ServeDir::new(state.config.storage.local_root.clone()))
        }
        StorageBackend::Memory | StorageBackend::Remote => api,
    };

    router.with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use chrono::{Duration, Utc};
    use serde_json::Value;

    use bridal_core::config::{AppConfig, StorageBackend};
    use bridal_core::domain::user::{hash_session_token, User, UserId, UserRole};

    use crate::state::AppState;
    use crate::storage::MemoryBlobStore;

    pub const ADMIN_TOKEN: &str = "admin-token";
    pub const EMPLOYEE_TOKEN: &str = "employee-token";
    pub const BLOB_BASE: &str = "http://blobs.test";

    pub struct TestApp {
        pub state: AppState,
        pub blobs: Arc<MemoryBlobStore>,
    }

    pub async fn app() -> TestApp {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.storage.public_base_url = BLOB_BASE.to_string();

        let blobs = Arc::new(MemoryBlobStore::new(BLOB_BASE));
        let state = AppState::in_memory(config, blobs.clone());

        for (id, role, token) in [
            ("u-admin", UserRole::Admin, ADMIN_TOKEN),
            ("u-employee", UserRole::Employee, EMPLOYEE_TOKEN),
        ] {
            let user = User {
                id: UserId(id.to_string()),
                name: format!("{id} name"),
                email: format!("{id}@atelier.example"),
                role,
                created_at: Utc::now(),
            };
            state.users.save(user.clone()).await.expect("save user");
            state
                .users
                .create_session(&user.id, &hash_session_token(token), Utc::now() + Duration::hours(1))
                .await
                .expect("session");
        }

        TestApp { state, blobs }
    }

    pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("session={token}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        }
    }

    pub async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }
}

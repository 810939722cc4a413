use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap, StatusCode};
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use bridal_core::domain::user::{hash_session_token, User};

use crate::error::{api_error, db_error, forbidden, ApiFailure, ApiResult};
use crate::state::AppState;

/// The authenticated caller, resolved from the session cookie (or a bearer
/// token carrying the same session value).
#[derive(Clone, Debug)]
pub struct SessionUser {
    pub user: User,
    pub correlation_id: String,
}

impl SessionUser {
    pub fn require_admin(&self) -> ApiResult<()> {
        if self.user.is_admin() {
            Ok(())
        } else {
            Err(forbidden("admin role required"))
        }
    }
}

pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let from_cookie = headers.get_all(header::COOKIE).iter().find_map(|value| {
        value.to_str().ok()?.split(';').find_map(|pair| {
            let (name, token) = pair.trim().split_once('=')?;
            (name == cookie_name && !token.is_empty()).then(|| token.to_string())
        })
    });

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    })
}

fn unauthorized() -> ApiFailure {
    api_error(StatusCode::UNAUTHORIZED, "authentication required")
}

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = ApiFailure;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(&parts.headers);
        let token = session_token(&parts.headers, &state.config.auth.session_cookie)
            .ok_or_else(unauthorized)?;

        let user = state
            .users
            .find_by_session(&hash_session_token(&token), Utc::now())
            .await
            .map_err(|error| db_error(error, &correlation_id))?;

        match user {
            Some(user) => {
                debug!(
                    event_name = "auth.session.resolved",
                    correlation_id = %correlation_id,
                    user_id = %user.id,
                    "session resolved"
                );
                Ok(Self { user, correlation_id })
            }
            None => {
                warn!(
                    event_name = "auth.session.rejected",
                    correlation_id = %correlation_id,
                    "unknown or expired session"
                );
                Err(unauthorized())
            }
        }
    }
}

use axum::{http::StatusCode, Json};
use bridal_core::errors::{ApplicationError, DomainError, InterfaceError};
use bridal_db::repositories::RepositoryError;
use serde::Serialize;
use tracing::error;

use crate::storage::StorageError;

/// Body of every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

pub type ApiFailure = (StatusCode, Json<ApiError>);
pub type ApiResult<T> = Result<T, ApiFailure>;

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiFailure {
    (status, Json(ApiError { error: message.into() }))
}

pub fn not_found(message: impl Into<String>) -> ApiFailure {
    api_error(StatusCode::NOT_FOUND, message)
}

pub fn bad_request(message: impl Into<String>) -> ApiFailure {
    api_error(StatusCode::BAD_REQUEST, message)
}

pub fn forbidden(message: impl Into<String>) -> ApiFailure {
    api_error(StatusCode::FORBIDDEN, message)
}

pub fn domain_error(error: DomainError) -> ApiFailure {
    bad_request(error.to_string())
}

fn interface_status(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn db_error(error: RepositoryError, correlation_id: &str) -> ApiFailure {
    if let RepositoryError::Conflict(what) = &error {
        return api_error(StatusCode::CONFLICT, format!("{what} already exists"));
    }

    error!(
        event_name = "api.persistence.error",
        correlation_id,
        error = %error,
        "repository call failed"
    );
    let interface = ApplicationError::Persistence(error.to_string()).into_interface(correlation_id);
    api_error(interface_status(&interface), interface.user_message())
}

pub fn storage_error(error: StorageError, correlation_id: &str) -> ApiFailure {
    error!(
        event_name = "api.storage.error",
        correlation_id,
        error = %error,
        "blob storage call failed"
    );
    let interface = ApplicationError::Storage(error.to_string()).into_interface(correlation_id);
    api_error(interface_status(&interface), interface.user_message())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use bridal_db::repositories::RepositoryError;

    use super::db_error;

    #[test]
    fn conflicts_surface_as_409() {
        let (status, body) = db_error(RepositoryError::Conflict("customer c-1".to_string()), "req");
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.0.error, "customer c-1 already exists");
    }

    #[test]
    fn other_repository_failures_hide_details() {
        let (status, body) = db_error(RepositoryError::Decode("bad json".to_string()), "req");
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body.0.error.contains("bad json"));
    }
}

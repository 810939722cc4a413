use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use bridal_core::domain::approval::ApprovalAction;
use bridal_core::domain::resource::{ResourceId, ResourceKind};

use crate::approvals::ExecutionError;
use crate::auth::SessionUser;
use crate::error::{bad_request, db_error, domain_error, not_found, ApiFailure, ApiResult};
use crate::routes::approvals::submit;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ReasonQuery {
    pub reason: Option<String>,
}

fn parse_kind(raw: &str) -> ApiResult<ResourceKind> {
    raw.parse::<ResourceKind>().map_err(domain_error)
}

pub(crate) fn execution_error(error: ExecutionError, correlation_id: &str) -> ApiFailure {
    match error {
        ExecutionError::ResourceNotFound { .. } => not_found(error.to_string()),
        ExecutionError::Repository(error) => db_error(error, correlation_id),
        ExecutionError::MissingResourceId(_)
        | ExecutionError::MissingNewData(_)
        | ExecutionError::CorruptDocument { .. }
        | ExecutionError::InvalidAttachments(_)
        | ExecutionError::Invalid(_) => bad_request(error.to_string()),
    }
}

/// Takes the optional `reason` out of a submitted body; it belongs to the
/// approval, not the resource.
fn split_reason(body: &mut Value) -> Option<String> {
    body.as_object_mut()
        .and_then(|fields| fields.remove("reason"))
        .and_then(|reason| reason.as_str().map(str::to_string))
}

async fn mutate(
    state: &AppState,
    caller: &SessionUser,
    action: ApprovalAction,
    kind: ResourceKind,
    resource_id: Option<ResourceId>,
    new_data: Option<Value>,
    reason: Option<String>,
) -> ApiResult<Response> {
    if !caller.user.is_admin() {
        let view = submit(state, caller, action, kind, resource_id, new_data, reason).await?;
        return Ok((StatusCode::ACCEPTED, Json(view)).into_response());
    }

    let stored = state
        .executor()
        .execute(action, kind, resource_id.as_ref(), new_data.as_ref(), &caller.correlation_id)
        .await
        .map_err(|error| execution_error(error, &caller.correlation_id))?;

    Ok(match (action, stored) {
        (ApprovalAction::Create, Some(document)) => {
            (StatusCode::CREATED, Json(document)).into_response()
        }
        (_, Some(document)) => Json(document).into_response(),
        (_, None) => Json(json!({ "deleted": true, "id": resource_id })).into_response(),
    })
}

pub async fn list(
    State(state): State<AppState>,
    caller: SessionUser,
    Path(kind): Path<String>,
) -> ApiResult<Json<Vec<Value>>> {
    let kind = parse_kind(&kind)?;
    state
        .resources
        .list(kind)
        .await
        .map(Json)
        .map_err(|error| db_error(error, &caller.correlation_id))
}

pub async fn get(
    State(state): State<AppState>,
    caller: SessionUser,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let kind = parse_kind(&kind)?;
    state
        .resources
        .find(kind, &ResourceId(id.clone()))
        .await
        .map_err(|error| db_error(error, &caller.correlation_id))?
        .map(Json)
        .ok_or_else(|| not_found(format!("{kind} {id} not found")))
}

pub async fn create(
    State(state): State<AppState>,
    caller: SessionUser,
    Path(kind): Path<String>,
    Json(mut body): Json<Value>,
) -> ApiResult<Response> {
    let kind = parse_kind(&kind)?;
    let reason = split_reason(&mut body);
    mutate(&state, &caller, ApprovalAction::Create, kind, None, Some(body), reason).await
}

pub async fn update(
    State(state): State<AppState>,
    caller: SessionUser,
    Path((kind, id)): Path<(String, String)>,
    Json(mut body): Json<Value>,
) -> ApiResult<Response> {
    let kind = parse_kind(&kind)?;
    let reason = split_reason(&mut body);
    mutate(&state, &caller, ApprovalAction::Edit, kind, Some(ResourceId(id)), Some(body), reason)
        .await
}

pub async fn delete(
    State(state): State<AppState>,
    caller: SessionUser,
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<ReasonQuery>,
) -> ApiResult<Response> {
    let kind = parse_kind(&kind)?;
    mutate(&state, &caller, ApprovalAction::Delete, kind, Some(ResourceId(id)), None, query.reason)
        .await
}

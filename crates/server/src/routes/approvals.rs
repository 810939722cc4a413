use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info};

use bridal_core::audit::{AuditEvent, AuditOutcome};
use bridal_core::domain::approval::{
    ApprovalAction, ApprovalId, ApprovalRequest, ApprovalStatus, NewApproval, ReviewDecision,
};
use bridal_core::domain::resource::{ResourceId, ResourceKind};
use bridal_db::repositories::ApprovalFilter;

use crate::approvals::{populate, populate_one, ApprovalView, ReviewError};
use crate::auth::SessionUser;
use crate::error::{
    api_error, bad_request, db_error, domain_error, forbidden, not_found, ApiFailure, ApiResult,
};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitApproval {
    pub action_type: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub new_data: Option<Value>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub action: ReviewDecision,
    pub comment: Option<String>,
}

/// Records a change request for later review. Edits and deletes snapshot
/// the current document as `originalData`.
pub async fn submit(
    state: &AppState,
    caller: &SessionUser,
    action: ApprovalAction,
    kind: ResourceKind,
    resource_id: Option<ResourceId>,
    new_data: Option<Value>,
    reason: Option<String>,
) -> ApiResult<ApprovalView> {
    let correlation_id = caller.correlation_id.as_str();
    let resource_id = resource_id.filter(|id| !id.0.trim().is_empty());

    let original_data = match (action, &resource_id) {
        (ApprovalAction::Edit | ApprovalAction::Delete, Some(id)) => {
            let current = state
                .resources
                .find(kind, id)
                .await
                .map_err(|error| db_error(error, correlation_id))?;
            Some(current.ok_or_else(|| not_found(format!("{kind} {id} not found")))?)
        }
        _ => None,
    };

    let approval = ApprovalRequest::new(
        NewApproval {
            requested_by: caller.user.id.clone(),
            action_type: action,
            resource_type: kind,
            resource_id,
            original_data,
            new_data,
            reason,
        },
        Utc::now(),
    )
    .map_err(domain_error)?;

    state.approvals.insert(approval.clone()).await.map_err(|error| db_error(error, correlation_id))?;
    info!(
        event_name = "approval.submitted",
        correlation_id,
        approval_id = %approval.id,
        requested_by = %caller.user.id,
        action_type = action.as_str(),
        resource_type = %kind,
        "approval request submitted"
    );

    let event = AuditEvent::new(
        Some(approval.id.clone()),
        correlation_id,
        "approval.submitted",
        caller.user.id.clone(),
        AuditOutcome::Success,
    )
    .with_metadata("action_type", action.as_str())
    .with_metadata("resource_type", kind.as_str());
    if let Err(audit_error) = state.audit.append(event).await {
        error!(
            event_name = "approval.audit.write_failed",
            correlation_id,
            error = %audit_error,
            "failed to write approval audit event"
        );
    }

    populate_one(state.users.as_ref(), approval).await.map_err(|error| db_error(error, correlation_id))
}

pub async fn list(
    State(state): State<AppState>,
    caller: SessionUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<ApprovalView>>> {
    let status = query
        .status
        .as_deref()
        .filter(|status| !status.is_empty() && *status != "all")
        .map(str::parse::<ApprovalStatus>)
        .transpose()
        .map_err(domain_error)?;

    let filter = ApprovalFilter {
        status,
        requested_by: (!caller.user.is_admin()).then(|| caller.user.id.clone()),
        limit: query.limit,
    };
    let approvals = state
        .approvals
        .list(&filter)
        .await
        .map_err(|error| db_error(error, &caller.correlation_id))?;

    populate(state.users.as_ref(), approvals)
        .await
        .map(Json)
        .map_err(|error| db_error(error, &caller.correlation_id))
}

pub async fn create(
    State(state): State<AppState>,
    caller: SessionUser,
    Json(request): Json<SubmitApproval>,
) -> ApiResult<(StatusCode, Json<ApprovalView>)> {
    let action = request.action_type.parse::<ApprovalAction>().map_err(domain_error)?;
    let kind = request.resource_type.parse::<ResourceKind>().map_err(domain_error)?;

    let view = submit(
        &state,
        &caller,
        action,
        kind,
        request.resource_id.map(ResourceId),
        request.new_data,
        request.reason,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get(
    State(state): State<AppState>,
    caller: SessionUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ApprovalView>> {
    let correlation_id = caller.correlation_id.as_str();
    let approval = state
        .approvals
        .find_by_id(&ApprovalId(id.clone()))
        .await
        .map_err(|error| db_error(error, correlation_id))?
        .ok_or_else(|| not_found(format!("approval {id} not found")))?;

    if !caller.user.is_admin() && approval.requested_by != caller.user.id {
        return Err(forbidden("approval belongs to another user"));
    }

    populate_one(state.users.as_ref(), approval)
        .await
        .map(Json)
        .map_err(|error| db_error(error, correlation_id))
}

fn review_error(error: ReviewError, correlation_id: &str) -> ApiFailure {
    match error {
        ReviewError::NotFound(id) => not_found(format!("approval {id} not found")),
        ReviewError::AlreadyReviewed(_) => bad_request(error.to_string()),
        ReviewError::Execution(_) => api_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
        ReviewError::Repository(error) => db_error(error, correlation_id),
    }
}

pub async fn review(
    State(state): State<AppState>,
    caller: SessionUser,
    Path(id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> ApiResult<Json<ApprovalView>> {
    caller.require_admin()?;

    state
        .review_gate()
        .review(
            &ApprovalId(id),
            &caller.user,
            request.action,
            request.comment,
            &caller.correlation_id,
        )
        .await
        .map(Json)
        .map_err(|error| review_error(error, &caller.correlation_id))
}

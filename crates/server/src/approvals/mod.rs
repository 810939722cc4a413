//! Approval workflow: the review gate decides, the executor applies, the
//! relocator moves staged uploads.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use bridal_core::domain::approval::{ApprovalAction, ApprovalId, ApprovalRequest, ApprovalStatus};
use bridal_core::domain::resource::{ResourceId, ResourceKind};
use bridal_core::domain::user::{UserId, UserRef};
use bridal_db::repositories::{RepositoryError, UserRepository};

pub mod executor;
pub mod relocate;
pub mod review;

pub use executor::{ActionExecutor, ExecutionError};
pub use relocate::AttachmentRelocator;
pub use review::{ReviewError, ReviewGate};

/// An approval as returned by the API, with user references populated.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalView {
    pub id: ApprovalId,
    pub requested_by: UserRef,
    pub action_type: ApprovalAction,
    pub resource_type: ResourceKind,
    pub resource_id: Option<ResourceId>,
    pub original_data: Option<Value>,
    pub new_data: Option<Value>,
    pub reason: Option<String>,
    pub status: ApprovalStatus,
    pub reviewed_by: Option<UserRef>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Users that no longer exist are shown by id only.
fn user_ref(users: &HashMap<UserId, UserRef>, id: &UserId) -> UserRef {
    users.get(id).cloned().unwrap_or_else(|| UserRef {
        id: id.clone(),
        name: String::new(),
        email: String::new(),
    })
}

pub async fn populate(
    users: &dyn UserRepository,
    approvals: Vec<ApprovalRequest>,
) -> Result<Vec<ApprovalView>, RepositoryError> {
    let mut ids: Vec<UserId> = approvals
        .iter()
        .flat_map(|approval| std::iter::once(&approval.requested_by).chain(&approval.reviewed_by))
        .cloned()
        .collect();
    ids.sort_by(|a, b| a.0.cmp(&b.0));
    ids.dedup();

    let known: HashMap<UserId, UserRef> = users
        .find_by_ids(&ids)
        .await?
        .into_iter()
        .map(|user| (user.id.clone(), user.to_ref()))
        .collect();

    Ok(approvals
        .into_iter()
        .map(|approval| ApprovalView {
            requested_by: user_ref(&known, &approval.requested_by),
            reviewed_by: approval.reviewed_by.as_ref().map(|id| user_ref(&known, id)),
            id: approval.id,
            action_type: approval.action_type,
            resource_type: approval.resource_type,
            resource_id: approval.resource_id,
            original_data: approval.original_data,
            new_data: approval.new_data,
            reason: approval.reason,
            status: approval.status,
            reviewed_at: approval.reviewed_at,
            review_comment: approval.review_comment,
            created_at: approval.created_at,
            updated_at: approval.updated_at,
        })
        .collect())
}

pub async fn populate_one(
    users: &dyn UserRepository,
    approval: ApprovalRequest,
) -> Result<ApprovalView, RepositoryError> {
    let mut views = populate(users, vec![approval]).await?;
    views.pop().ok_or_else(|| RepositoryError::Decode("approval vanished while populating".into()))
}

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::resource::{ResourceId, ResourceKind};
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalId(pub String);

impl ApprovalId {
    pub fn generate() -> Self {
        Self(format!("APR-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Edit,
    Delete,
    Create,
}

impl ApprovalAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Create => "create",
        }
    }
}

impl std::str::FromStr for ApprovalAction {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "edit" => Ok(Self::Edit),
            "delete" => Ok(Self::Delete),
            "create" => Ok(Self::Create),
            other => Err(DomainError::InvariantViolation(format!("unknown action `{other}`"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(DomainError::InvariantViolation(format!("unknown status `{other}`"))),
        }
    }
}

/// What the reviewing admin decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn target_status(self) -> ApprovalStatus {
        match self {
            Self::Approve => ApprovalStatus::Approved,
            Self::Reject => ApprovalStatus::Rejected,
        }
    }
}

/// A proposed mutation against one resource, held until an admin reviews it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: ApprovalId,
    pub requested_by: UserId,
    pub action_type: ApprovalAction,
    pub resource_type: ResourceKind,
    pub resource_id: Option<ResourceId>,
    pub original_data: Option<Value>,
    pub new_data: Option<Value>,
    pub reason: Option<String>,
    pub status: ApprovalStatus,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything a requester supplies when submitting a change.
#[derive(Clone, Debug, PartialEq)]
pub struct NewApproval {
    pub requested_by: UserId,
    pub action_type: ApprovalAction,
    pub resource_type: ResourceKind,
    pub resource_id: Option<ResourceId>,
    pub original_data: Option<Value>,
    pub new_data: Option<Value>,
    pub reason: Option<String>,
}

impl ApprovalRequest {
    pub fn new(input: NewApproval, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let needs_target = matches!(input.action_type, ApprovalAction::Edit | ApprovalAction::Delete);
        if needs_target && input.resource_id.as_ref().map_or(true, |id| id.0.trim().is_empty()) {
            return Err(DomainError::MissingResourceId(input.action_type));
        }

        let needs_payload =
            matches!(input.action_type, ApprovalAction::Edit | ApprovalAction::Create);
        if needs_payload && !matches!(input.new_data, Some(Value::Object(_))) {
            return Err(DomainError::MissingNewData(input.action_type));
        }

        Ok(Self {
            id: ApprovalId::generate(),
            requested_by: input.requested_by,
            action_type: input.action_type,
            resource_type: input.resource_type,
            resource_id: input.resource_id,
            original_data: input.original_data,
            new_data: input.new_data,
            reason: input.reason.filter(|reason| !reason.trim().is_empty()),
            status: ApprovalStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            review_comment: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    /// Records a review. Only a pending request can be reviewed, and only once.
    pub fn review(
        &mut self,
        decision: ReviewDecision,
        reviewer: UserId,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let to = decision.target_status();
        if !self.is_pending() {
            return Err(DomainError::InvalidApprovalTransition { from: self.status, to });
        }

        self.status = to;
        self.reviewed_by = Some(reviewer);
        self.reviewed_at = Some(at);
        self.review_comment = comment.filter(|comment| !comment.trim().is_empty());
        self.updated_at = at;
        Ok(())
    }

    /// Undoes an approval whose mutation could not be carried out.
    pub fn reopen(&mut self, at: DateTime<Utc>) {
        self.status = ApprovalStatus::Pending;
        self.reviewed_by = None;
        self.reviewed_at = None;
        self.review_comment = None;
        self.updated_at = at;
    }
}

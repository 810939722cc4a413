use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::approval::ApprovalId;
use crate::domain::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

/// One entry in the approval audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub approval_id: Option<ApprovalId>,
    pub correlation_id: String,
    pub event_type: String,
    pub actor: UserId,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        approval_id: Option<ApprovalId>,
        correlation_id: impl Into<String>,
        event_type: impl Into<String>,
        actor: UserId,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            approval_id,
            correlation_id: correlation_id.into(),
            event_type: event_type.into(),
            actor,
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditEvent, AuditOutcome};
    use crate::domain::approval::ApprovalId;
    use crate::domain::user::UserId;

    #[test]
    fn event_carries_correlation_and_metadata() {
        let event = AuditEvent::new(
            Some(ApprovalId("APR-42".to_owned())),
            "req-123",
            "approval.approved",
            UserId("u-admin".to_owned()),
            AuditOutcome::Success,
        )
        .with_metadata("resource_type", "cost")
        .with_metadata("action_type", "delete");

        assert_eq!(event.correlation_id, "req-123");
        assert_eq!(event.approval_id.as_ref().map(|id| id.0.as_str()), Some("APR-42"));
        assert_eq!(event.metadata.get("resource_type").map(String::as_str), Some("cost"));
        assert!(!event.event_id.is_empty());
    }
}

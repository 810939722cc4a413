use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

use bridal_core::audit::{AuditEvent, AuditOutcome};
use bridal_core::domain::approval::{ApprovalId, ApprovalRequest, ApprovalStatus, ReviewDecision};
use bridal_core::domain::user::User;
use bridal_db::repositories::{
    ApprovalRepository, AuditRepository, RepositoryError, UserRepository,
};

use super::executor::{ActionExecutor, ExecutionError};
use super::{populate_one, ApprovalView};

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("approval {0} not found")]
    NotFound(ApprovalId),
    #[error("approval has already been {}", .0.as_str())]
    AlreadyReviewed(ApprovalStatus),
    #[error("approved change could not be applied: {0}")]
    Execution(#[source] ExecutionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Single entry point for approving or rejecting a pending request.
#[derive(Clone)]
pub struct ReviewGate {
    approvals: Arc<dyn ApprovalRepository>,
    users: Arc<dyn UserRepository>,
    audit: Arc<dyn AuditRepository>,
    executor: ActionExecutor,
}

impl ReviewGate {
    pub fn new(
        approvals: Arc<dyn ApprovalRepository>,
        users: Arc<dyn UserRepository>,
        audit: Arc<dyn AuditRepository>,
        executor: ActionExecutor,
    ) -> Self {
        Self { approvals, users, audit, executor }
    }

    pub async fn review(
        &self,
        approval_id: &ApprovalId,
        reviewer: &User,
        decision: ReviewDecision,
        comment: Option<String>,
        correlation_id: &str,
    ) -> Result<ApprovalView, ReviewError> {
        let approval = self
            .approvals
            .find_by_id(approval_id)
            .await?
            .ok_or_else(|| ReviewError::NotFound(approval_id.clone()))?;

        if !approval.is_pending() {
            warn!(
                event_name = "approval.review.not_pending",
                correlation_id,
                approval_id = %approval_id,
                status = approval.status.as_str(),
                "approval already reviewed"
            );
            return Err(ReviewError::AlreadyReviewed(approval.status));
        }

        let comment = comment.filter(|comment| !comment.trim().is_empty());
        let won = self
            .approvals
            .record_review(
                approval_id,
                decision,
                &reviewer.id,
                comment.as_deref(),
                Utc::now(),
            )
            .await?;
        if !won {
            let current = self
                .approvals
                .find_by_id(approval_id)
                .await?
                .map_or(ApprovalStatus::Approved, |current| current.status);
            warn!(
                event_name = "approval.review.lost_race",
                correlation_id,
                approval_id = %approval_id,
                "approval was reviewed concurrently"
            );
            return Err(ReviewError::AlreadyReviewed(current));
        }

        if decision == ReviewDecision::Approve {
            if let Err(failure) = self.apply(&approval, correlation_id).await {
                self.roll_back(&approval, reviewer, &failure, correlation_id).await;
                return Err(ReviewError::Execution(failure));
            }
        }

        let (event_type, outcome) = match decision {
            ReviewDecision::Approve => ("approval.approved", AuditOutcome::Success),
            ReviewDecision::Reject => ("approval.rejected", AuditOutcome::Rejected),
        };
        info!(
            event_name = %format!("approval.review.{}", decision.target_status().as_str()),
            correlation_id,
            approval_id = %approval_id,
            reviewer = %reviewer.id,
            action_type = approval.action_type.as_str(),
            resource_type = %approval.resource_type,
            "approval reviewed"
        );
        self.record(audit_event(&approval, reviewer, correlation_id, event_type, outcome)).await;

        let reviewed = self
            .approvals
            .find_by_id(approval_id)
            .await?
            .ok_or_else(|| ReviewError::NotFound(approval_id.clone()))?;
        Ok(populate_one(self.users.as_ref(), reviewed).await?)
    }

    async fn apply(
        &self,
        approval: &ApprovalRequest,
        correlation_id: &str,
    ) -> Result<(), ExecutionError> {
        self.executor
            .execute(
                approval.action_type,
                approval.resource_type,
                approval.resource_id.as_ref(),
                approval.new_data.as_ref(),
                correlation_id,
            )
            .await
            .map(|_| ())
    }

    async fn roll_back(
        &self,
        approval: &ApprovalRequest,
        reviewer: &User,
        failure: &ExecutionError,
        correlation_id: &str,
    ) {
        error!(
            event_name = "approval.review.execution_failed",
            correlation_id,
            approval_id = %approval.id,
            action_type = approval.action_type.as_str(),
            resource_type = %approval.resource_type,
            error = %failure,
            "approved change failed, reopening approval"
        );

        match self.approvals.reopen(&approval.id, Utc::now()).await {
            Ok(true) => info!(
                event_name = "approval.review.rolled_back",
                correlation_id,
                approval_id = %approval.id,
                "approval returned to pending"
            ),
            Ok(false) => warn!(
                event_name = "approval.review.rollback_skipped",
                correlation_id,
                approval_id = %approval.id,
                "approval was already pending"
            ),
            Err(reopen_error) => error!(
                event_name = "approval.review.rollback_failed",
                correlation_id,
                approval_id = %approval.id,
                error = %reopen_error,
                "approval could not be reopened"
            ),
        }

        self.record(
            audit_event(
                approval,
                reviewer,
                correlation_id,
                "approval.execution_failed",
                AuditOutcome::Failed,
            )
            .with_metadata("error", failure.to_string()),
        )
        .await;
    }

    async fn record(&self, event: AuditEvent) {
        let event_type = event.event_type.clone();
        if let Err(audit_error) = self.audit.append(event).await {
            error!(
                event_name = "approval.audit.write_failed",
                audit_event = %event_type,
                error = %audit_error,
                "failed to write approval audit event"
            );
        }
    }
}

fn audit_event(
    approval: &ApprovalRequest,
    reviewer: &User,
    correlation_id: &str,
    event_type: &str,
    outcome: AuditOutcome,
) -> AuditEvent {
    let event = AuditEvent::new(
        Some(approval.id.clone()),
        correlation_id,
        event_type,
        reviewer.id.clone(),
        outcome,
    )
    .with_metadata("action_type", approval.action_type.as_str())
    .with_metadata("resource_type", approval.resource_type.as_str());

    match &approval.resource_id {
        Some(resource_id) => event.with_metadata("resource_id", resource_id.0.clone()),
        None => event,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::{json, Value};

    use bridal_core::domain::approval::{
        ApprovalAction, ApprovalRequest, ApprovalStatus, NewApproval, ReviewDecision,
    };
    use bridal_core::domain::payment::Payment;
    use bridal_core::domain::resource::{ResourceId, ResourceKind};
    use bridal_core::domain::user::{User, UserId, UserRole};
    use bridal_db::repositories::{
        ApprovalRepository, InMemoryApprovalRepository, InMemoryAuditRepository,
        InMemoryResourceRepository, InMemoryUserRepository, RepositoryError, ResourceRepository,
        UserRepository,
    };

    use super::{ReviewError, ReviewGate};
    use crate::approvals::{ActionExecutor, AttachmentRelocator};
    use crate::storage::{BlobStore, MemoryBlobStore};

    struct Harness {
        approvals: Arc<InMemoryApprovalRepository>,
        audit: Arc<InMemoryAuditRepository>,
        resources: Arc<dyn ResourceRepository>,
        blobs: Arc<MemoryBlobStore>,
        gate: ReviewGate,
        admin: User,
    }

    fn user(id: &str, role: UserRole) -> User {
        User {
            id: UserId(id.to_string()),
            name: format!("{id} name"),
            email: format!("{id}@atelier.example"),
            role,
            created_at: Utc::now(),
        }
    }

    async fn harness_with(resources: Arc<dyn ResourceRepository>) -> Harness {
        let approvals = Arc::new(InMemoryApprovalRepository::default());
        let audit = Arc::new(InMemoryAuditRepository::default());
        let users = Arc::new(InMemoryUserRepository::default());
        let admin = user("u-admin", UserRole::Admin);
        users.save(admin.clone()).await.expect("save admin");
        users.save(user("u-employee", UserRole::Employee)).await.expect("save employee");

        let blobs = Arc::new(MemoryBlobStore::new("http://blobs.test"));
        let executor = ActionExecutor::new(
            resources.clone(),
            AttachmentRelocator::new(blobs.clone(), "approvals"),
        );
        let gate = ReviewGate::new(approvals.clone(), users, audit.clone(), executor);
        Harness { approvals, audit, resources, blobs, gate, admin }
    }

    async fn harness() -> Harness {
        harness_with(Arc::new(InMemoryResourceRepository::default())).await
    }

    async fn submit(
        h: &Harness,
        action: ApprovalAction,
        kind: ResourceKind,
        resource_id: &str,
        new_data: Option<Value>,
    ) -> ApprovalRequest {
        let approval = ApprovalRequest::new(
            NewApproval {
                requested_by: UserId("u-employee".to_string()),
                action_type: action,
                resource_type: kind,
                resource_id: Some(ResourceId(resource_id.to_string())),
                original_data: None,
                new_data,
                reason: Some("requested at the counter".to_string()),
            },
            Utc::now(),
        )
        .expect("valid approval");
        h.approvals.insert(approval.clone()).await.expect("insert approval");
        approval
    }

    async fn seed_cost(resources: &dyn ResourceRepository, id: &str) {
        resources
            .insert(
                ResourceKind::Cost,
                json!({
                    "id": id,
                    "category": "alterations",
                    "amount": 250,
                    "incurredAt": "2026-02-10T00:00:00Z",
                    "attachments": [],
                    "createdAt": "2026-02-10T00:00:00Z",
                    "updatedAt": "2026-02-10T00:00:00Z"
                }),
            )
            .await
            .expect("seed cost");
    }

    #[tokio::test]
    async fn approving_a_delete_removes_the_cost() {
        let h = harness().await;
        seed_cost(h.resources.as_ref(), "cost-x").await;
        let approval = submit(&h, ApprovalAction::Delete, ResourceKind::Cost, "cost-x", None).await;

        let view = h
            .gate
            .review(&approval.id, &h.admin, ReviewDecision::Approve, None, "req-1")
            .await
            .expect("review");

        assert_eq!(view.status, ApprovalStatus::Approved);
        assert_eq!(view.reviewed_by.as_ref().map(|r| r.name.as_str()), Some("u-admin name"));
        assert_eq!(view.requested_by.email, "u-employee@atelier.example");
        assert!(h
            .resources
            .find(ResourceKind::Cost, &ResourceId("cost-x".to_string()))
            .await
            .expect("find")
            .is_none());

        let events = h.audit.all().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "approval.approved");
        assert_eq!(events[0].correlation_id, "req-1");
    }

    #[tokio::test]
    async fn reviewing_twice_is_rejected_and_keeps_status() {
        let h = harness().await;
        let approval = submit(
            &h,
            ApprovalAction::Edit,
            ResourceKind::Customer,
            "c-1",
            Some(json!({ "name": "x" })),
        )
        .await;

        h.gate
            .review(&approval.id, &h.admin, ReviewDecision::Reject, Some("no".into()), "req")
            .await
            .expect("first review");
        let error = h
            .gate
            .review(&approval.id, &h.admin, ReviewDecision::Approve, None, "req")
            .await
            .unwrap_err();

        assert!(matches!(error, ReviewError::AlreadyReviewed(ApprovalStatus::Rejected)));
        let stored = h.approvals.find_by_id(&approval.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, ApprovalStatus::Rejected);
        assert_eq!(stored.review_comment.as_deref(), Some("no"));
    }

    #[tokio::test]
    async fn unknown_approval_is_not_found() {
        let h = harness().await;
        let error = h
            .gate
            .review(
                &bridal_core::domain::approval::ApprovalId("APR-missing".to_string()),
                &h.admin,
                ReviewDecision::Approve,
                None,
                "req",
            )
            .await
            .unwrap_err();
        assert!(matches!(error, ReviewError::NotFound(_)));
    }

    #[tokio::test]
    async fn failed_execution_reopens_the_approval() {
        let h = harness().await;
        let approval =
            submit(&h, ApprovalAction::Delete, ResourceKind::Cost, "cost-missing", None).await;

        let error = h
            .gate
            .review(&approval.id, &h.admin, ReviewDecision::Approve, Some("ok".into()), "req")
            .await
            .unwrap_err();
        assert!(matches!(error, ReviewError::Execution(_)));

        let stored = h.approvals.find_by_id(&approval.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, ApprovalStatus::Pending);
        assert!(stored.reviewed_by.is_none());
        assert!(stored.reviewed_at.is_none());
        assert!(stored.review_comment.is_none());

        let events = h.audit.all().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "approval.execution_failed");
        assert!(events[0].metadata.contains_key("error"));
    }

    /// Fails the test if the review touches any resource collection.
    struct UntouchableResources;

    #[async_trait]
    impl ResourceRepository for UntouchableResources {
        async fn find(
            &self,
            kind: ResourceKind,
            _id: &ResourceId,
        ) -> Result<Option<Value>, RepositoryError> {
            panic!("{kind} collection read during review")
        }

        async fn list(&self, kind: ResourceKind) -> Result<Vec<Value>, RepositoryError> {
            panic!("{kind} collection listed during review")
        }

        async fn insert(&self, kind: ResourceKind, _document: Value) -> Result<(), RepositoryError> {
            panic!("{kind} collection written during review")
        }

        async fn replace(
            &self,
            kind: ResourceKind,
            _document: Value,
        ) -> Result<bool, RepositoryError> {
            panic!("{kind} collection written during review")
        }

        async fn delete(&self, kind: ResourceKind, _id: &ResourceId) -> Result<bool, RepositoryError> {
            panic!("{kind} collection written during review")
        }

        async fn payments_for_reservation(
            &self,
            _reservation_id: &ResourceId,
        ) -> Result<Vec<Payment>, RepositoryError> {
            panic!("payments read during review")
        }
    }

    #[tokio::test]
    async fn invalid_payment_create_keeps_the_staged_upload() {
        let h = harness().await;
        let staged = h
            .blobs
            .put("approvals/1-receipt.pdf", b"receipt".to_vec(), "application/pdf")
            .await
            .expect("stage");
        let approval = submit(
            &h,
            ApprovalAction::Create,
            ResourceKind::Payment,
            "p-new",
            Some(json!({ "amount": "oops", "attachments": [{ "url": staged.url }] })),
        )
        .await;

        let error = h
            .gate
            .review(&approval.id, &h.admin, ReviewDecision::Approve, None, "req")
            .await
            .unwrap_err();
        assert!(matches!(error, ReviewError::Execution(_)));

        let stored = h.approvals.find_by_id(&approval.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, ApprovalStatus::Pending);
        assert!(h.blobs.contains("approvals/1-receipt.pdf").await);
        assert_eq!(h.blobs.pathnames().await, vec!["approvals/1-receipt.pdf".to_string()]);
        assert!(h.resources.list(ResourceKind::Payment).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn payment_delete_is_approved_when_the_reservation_is_unreadable() {
        let h = harness().await;
        h.resources
            .insert(
                ResourceKind::Reservation,
                json!({
                    "id": "res-1",
                    "total": 1200,
                    "createdAt": "2026-04-01T10:00:00Z",
                    "updatedAt": "2026-04-01T10:00:00Z"
                }),
            )
            .await
            .expect("seed reservation");
        h.resources
            .insert(
                ResourceKind::Payment,
                json!({
                    "id": "p1",
                    "reservationId": "res-1",
                    "amount": 300,
                    "paidAt": "2026-04-02T00:00:00Z",
                    "createdAt": "2026-04-02T00:00:00Z",
                    "updatedAt": "2026-04-02T00:00:00Z"
                }),
            )
            .await
            .expect("seed payment");
        let approval = submit(&h, ApprovalAction::Delete, ResourceKind::Payment, "p1", None).await;

        let view = h
            .gate
            .review(&approval.id, &h.admin, ReviewDecision::Approve, None, "req")
            .await
            .expect("review");

        assert_eq!(view.status, ApprovalStatus::Approved);
        assert!(h
            .resources
            .find(ResourceKind::Payment, &ResourceId("p1".to_string()))
            .await
            .expect("find")
            .is_none());
        let events = h.audit.all().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "approval.approved");
    }

    #[tokio::test]
    async fn rejecting_never_touches_resources() {
        let h = harness_with(Arc::new(UntouchableResources)).await;
        let approval =
            submit(&h, ApprovalAction::Delete, ResourceKind::Reservation, "res-1", None).await;

        let view = h
            .gate
            .review(&approval.id, &h.admin, ReviewDecision::Reject, None, "req")
            .await
            .expect("reject");

        assert_eq!(view.status, ApprovalStatus::Rejected);
        assert_eq!(h.audit.all().await[0].event_type, "approval.rejected");
    }

    #[tokio::test]
    async fn concurrent_reviews_have_one_winner() {
        let h = harness().await;
        seed_cost(h.resources.as_ref(), "cost-race").await;
        let approval =
            submit(&h, ApprovalAction::Delete, ResourceKind::Cost, "cost-race", None).await;

        let (first, second) = tokio::join!(
            h.gate.review(&approval.id, &h.admin, ReviewDecision::Approve, None, "a"),
            h.gate.review(&approval.id, &h.admin, ReviewDecision::Approve, None, "b"),
        );

        let winners = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(winners, 1);
        let loser = if first.is_err() { first } else { second };
        assert!(matches!(loser, Err(ReviewError::AlreadyReviewed(_))));
    }
}

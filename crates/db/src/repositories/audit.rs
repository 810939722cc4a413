use std::collections::BTreeMap;

use sqlx::Row;

use bridal_core::audit::{AuditEvent, AuditOutcome};
use bridal_core::domain::approval::ApprovalId;
use bridal_core::domain::user::UserId;

use super::{format_timestamp, parse_timestamp, AuditRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditRepository {
    pool: DbPool,
}

impl SqlAuditRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_outcome(raw: &str) -> AuditOutcome {
    match raw {
        "rejected" => AuditOutcome::Rejected,
        "failed" => AuditOutcome::Failed,
        _ => AuditOutcome::Success,
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
    let event_id: String = row.try_get("id").map_err(decode)?;
    let approval_id: Option<String> = row.try_get("approval_id").map_err(decode)?;
    let correlation_id: String = row.try_get("correlation_id").map_err(decode)?;
    let event_type: String = row.try_get("event_type").map_err(decode)?;
    let actor: String = row.try_get("actor").map_err(decode)?;
    let outcome: String = row.try_get("outcome").map_err(decode)?;
    let metadata_json: String = row.try_get("metadata_json").map_err(decode)?;
    let occurred_at: String = row.try_get("occurred_at").map_err(decode)?;

    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(AuditEvent {
        event_id,
        approval_id: approval_id.map(ApprovalId),
        correlation_id,
        event_type,
        actor: UserId(actor),
        outcome: parse_outcome(&outcome),
        metadata,
        occurred_at: parse_timestamp(&occurred_at)?,
    })
}

#[async_trait::async_trait]
impl AuditRepository for SqlAuditRepository {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError> {
        let metadata_json = serde_json::to_string(&event.metadata)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO audit_event (id, approval_id, correlation_id, event_type, actor,
                                      outcome, metadata_json, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(event.approval_id.as_ref().map(|id| id.0.as_str()))
        .bind(&event.correlation_id)
        .bind(&event.event_type)
        .bind(&event.actor.0)
        .bind(event.outcome.as_str())
        .bind(metadata_json)
        .bind(format_timestamp(event.occurred_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_approval(
        &self,
        approval_id: &ApprovalId,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, approval_id, correlation_id, event_type, actor, outcome, metadata_json,
                    occurred_at
             FROM audit_event WHERE approval_id = ? ORDER BY occurred_at ASC",
        )
        .bind(&approval_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }
}

#[cfg(test)]
mod tests {
    use bridal_core::audit::{AuditEvent, AuditOutcome};
    use bridal_core::domain::approval::ApprovalId;
    use bridal_core::domain::user::UserId;

    use super::SqlAuditRepository;
    use crate::repositories::AuditRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn events_are_listed_per_approval_with_metadata() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlAuditRepository::new(pool);

        let approval_id = ApprovalId("APR-1".to_string());
        repo.append(
            AuditEvent::new(
                Some(approval_id.clone()),
                "req-1",
                "approval.execution_failed",
                UserId("u-admin".to_string()),
                AuditOutcome::Failed,
            )
            .with_metadata("error", "cost cost-9 not found"),
        )
        .await
        .expect("append failure");
        repo.append(AuditEvent::new(
            Some(ApprovalId("APR-2".to_string())),
            "req-2",
            "approval.rejected",
            UserId("u-admin".to_string()),
            AuditOutcome::Rejected,
        ))
        .await
        .expect("append other");

        let events = repo.list_for_approval(&approval_id).await.expect("list");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "approval.execution_failed");
        assert_eq!(events[0].outcome, AuditOutcome::Failed);
        assert_eq!(
            events[0].metadata.get("error").map(String::as_str),
            Some("cost cost-9 not found")
        );
    }
}

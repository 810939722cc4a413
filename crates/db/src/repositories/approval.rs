use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{QueryBuilder, Row, Sqlite};

use bridal_core::domain::approval::{
    ApprovalAction, ApprovalId, ApprovalRequest, ApprovalStatus, ReviewDecision,
};
use bridal_core::domain::resource::{ResourceId, ResourceKind};
use bridal_core::domain::user::UserId;

use super::{
    format_timestamp, parse_timestamp, ApprovalFilter, ApprovalRepository, RepositoryError,
};
use crate::DbPool;

const APPROVAL_COLUMNS: &str = "id, requested_by, action_type, resource_type, resource_id,
    original_data, new_data, reason, status, reviewed_by, reviewed_at, review_comment,
    created_at, updated_at";

pub struct SqlApprovalRepository {
    pool: DbPool,
}

impl SqlApprovalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T>(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn decode_json(raw: Option<String>) -> Result<Option<Value>, RepositoryError> {
    raw.map(|raw| serde_json::from_str(&raw).map_err(|e| RepositoryError::Decode(e.to_string())))
        .transpose()
}

fn encode_json(value: &Option<Value>) -> Result<Option<String>, RepositoryError> {
    value
        .as_ref()
        .map(|value| serde_json::to_string(value).map_err(|e| RepositoryError::Decode(e.to_string())))
        .transpose()
}

fn row_to_approval(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalRequest, RepositoryError> {
    let id: String = decode(row, "id")?;
    let requested_by: String = decode(row, "requested_by")?;
    let action_type: String = decode(row, "action_type")?;
    let resource_type: String = decode(row, "resource_type")?;
    let resource_id: Option<String> = decode(row, "resource_id")?;
    let original_data: Option<String> = decode(row, "original_data")?;
    let new_data: Option<String> = decode(row, "new_data")?;
    let reason: Option<String> = decode(row, "reason")?;
    let status: String = decode(row, "status")?;
    let reviewed_by: Option<String> = decode(row, "reviewed_by")?;
    let reviewed_at: Option<String> = decode(row, "reviewed_at")?;
    let review_comment: Option<String> = decode(row, "review_comment")?;
    let created_at: String = decode(row, "created_at")?;
    let updated_at: String = decode(row, "updated_at")?;

    let domain = |e: bridal_core::DomainError| RepositoryError::Decode(e.to_string());

    Ok(ApprovalRequest {
        id: ApprovalId(id),
        requested_by: UserId(requested_by),
        action_type: action_type.parse::<ApprovalAction>().map_err(domain)?,
        resource_type: resource_type.parse::<ResourceKind>().map_err(domain)?,
        resource_id: resource_id.map(ResourceId),
        original_data: decode_json(original_data)?,
        new_data: decode_json(new_data)?,
        reason,
        status: status.parse::<ApprovalStatus>().map_err(domain)?,
        reviewed_by: reviewed_by.map(UserId),
        reviewed_at: reviewed_at.as_deref().map(parse_timestamp).transpose()?,
        review_comment,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl ApprovalRepository for SqlApprovalRepository {
    async fn find_by_id(
        &self,
        id: &ApprovalId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {APPROVAL_COLUMNS} FROM approval_request WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_approval(r)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, approval: ApprovalRequest) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO approval_request (id, requested_by, action_type, resource_type,
                                           resource_id, original_data, new_data, reason, status,
                                           reviewed_by, reviewed_at, review_comment,
                                           created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&approval.id.0)
        .bind(&approval.requested_by.0)
        .bind(approval.action_type.as_str())
        .bind(approval.resource_type.as_str())
        .bind(approval.resource_id.as_ref().map(|id| id.0.as_str()))
        .bind(encode_json(&approval.original_data)?)
        .bind(encode_json(&approval.new_data)?)
        .bind(&approval.reason)
        .bind(approval.status.as_str())
        .bind(approval.reviewed_by.as_ref().map(|id| id.0.as_str()))
        .bind(approval.reviewed_at.map(format_timestamp))
        .bind(&approval.review_comment)
        .bind(format_timestamp(approval.created_at))
        .bind(format_timestamp(approval.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                Err(RepositoryError::Conflict(format!("approval {}", approval.id)))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn list(&self, filter: &ApprovalFilter) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let mut query: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {APPROVAL_COLUMNS} FROM approval_request WHERE 1 = 1"));
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(requested_by) = &filter.requested_by {
            query.push(" AND requested_by = ").push_bind(requested_by.0.clone());
        }
        query.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_approval).collect::<Result<Vec<_>, _>>()
    }

    async fn record_review(
        &self,
        id: &ApprovalId,
        decision: ReviewDecision,
        reviewer: &UserId,
        comment: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let at = format_timestamp(at);
        let comment = comment.filter(|comment| !comment.trim().is_empty());
        let result = sqlx::query(
            "UPDATE approval_request
             SET status = ?, reviewed_by = ?, reviewed_at = ?, review_comment = ?, updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(decision.target_status().as_str())
        .bind(&reviewer.0)
        .bind(&at)
        .bind(comment)
        .bind(&at)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn reopen(&self, id: &ApprovalId, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE approval_request
             SET status = 'pending', reviewed_by = NULL, reviewed_at = NULL,
                 review_comment = NULL, updated_at = ?
             WHERE id = ? AND status <> 'pending'",
        )
        .bind(format_timestamp(at))
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

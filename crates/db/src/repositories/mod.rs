use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use thiserror::Error;

use bridal_core::audit::AuditEvent;
use bridal_core::domain::approval::{ApprovalId, ApprovalRequest, ApprovalStatus, ReviewDecision};
use bridal_core::domain::payment::Payment;
use bridal_core::domain::preferences::WidgetPreferences;
use bridal_core::domain::resource::{ResourceId, ResourceKind};
use bridal_core::domain::user::{User, UserId};

pub mod approval;
pub mod audit;
pub mod memory;
pub mod preferences;
pub mod resource;
pub mod user;

pub use approval::SqlApprovalRepository;
pub use audit::SqlAuditRepository;
pub use memory::{
    InMemoryApprovalRepository, InMemoryAuditRepository, InMemoryPreferenceRepository,
    InMemoryResourceRepository, InMemoryUserRepository,
};
pub use preferences::SqlPreferenceRepository;
pub use resource::SqlResourceRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{0} already exists")]
    Conflict(String),
}

/// Narrows an approval listing. Unset fields do not filter.
#[derive(Clone, Debug, Default)]
pub struct ApprovalFilter {
    pub status: Option<ApprovalStatus>,
    pub requested_by: Option<UserId>,
    pub limit: Option<u32>,
}

impl ApprovalFilter {
    pub fn matches(&self, approval: &ApprovalRequest) -> bool {
        self.status.map_or(true, |status| approval.status == status)
            && self.requested_by.as_ref().map_or(true, |user| &approval.requested_by == user)
    }
}

#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    async fn find_by_id(&self, id: &ApprovalId)
        -> Result<Option<ApprovalRequest>, RepositoryError>;

    async fn insert(&self, approval: ApprovalRequest) -> Result<(), RepositoryError>;

    /// Newest first.
    async fn list(&self, filter: &ApprovalFilter) -> Result<Vec<ApprovalRequest>, RepositoryError>;

    /// Stores a review decision only if the request is still pending.
    /// Returns `false` when another review got there first.
    async fn record_review(
        &self,
        id: &ApprovalId,
        decision: ReviewDecision,
        reviewer: &UserId,
        comment: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Puts a reviewed request back to pending and clears the reviewer fields.
    async fn reopen(&self, id: &ApprovalId, at: DateTime<Utc>) -> Result<bool, RepositoryError>;
}

/// Resource documents keyed by kind and id. Documents are stored as the
/// canonical JSON of their typed resource and carry their own `id`.
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    async fn find(&self, kind: ResourceKind, id: &ResourceId)
        -> Result<Option<Value>, RepositoryError>;

    /// Newest first.
    async fn list(&self, kind: ResourceKind) -> Result<Vec<Value>, RepositoryError>;

    async fn insert(&self, kind: ResourceKind, document: Value) -> Result<(), RepositoryError>;

    /// Returns `false` when no document with that id exists.
    async fn replace(&self, kind: ResourceKind, document: Value) -> Result<bool, RepositoryError>;

    /// Returns `false` when no document with that id exists.
    async fn delete(&self, kind: ResourceKind, id: &ResourceId) -> Result<bool, RepositoryError>;

    async fn payments_for_reservation(
        &self,
        reservation_id: &ResourceId,
    ) -> Result<Vec<Payment>, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn save(&self, user: User) -> Result<(), RepositoryError>;

    async fn create_session(
        &self,
        user_id: &UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// The user owning an unexpired session.
    async fn find_by_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError>;
}

#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    async fn widgets(&self, user_id: &UserId)
        -> Result<Option<WidgetPreferences>, RepositoryError>;
    async fn save_widgets(&self, preferences: WidgetPreferences) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError>;
    async fn list_for_approval(
        &self,
        approval_id: &ApprovalId,
    ) -> Result<Vec<AuditEvent>, RepositoryError>;
}

pub(crate) fn document_id(document: &Value) -> Result<String, RepositoryError> {
    document
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| RepositoryError::Decode("document has no `id`".to_string()))
}

pub(crate) fn document_field(document: &Value, field: &str) -> String {
    document.get(field).and_then(Value::as_str).unwrap_or_default().to_string()
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {error}")))
}

pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use bridal_core::audit::AuditEvent;
use bridal_core::domain::approval::{ApprovalId, ApprovalRequest, ReviewDecision};
use bridal_core::domain::payment::Payment;
use bridal_core::domain::preferences::WidgetPreferences;
use bridal_core::domain::resource::{ResourceId, ResourceKind};
use bridal_core::domain::user::{User, UserId};

use super::{
    document_id, document_field, ApprovalFilter, ApprovalRepository, AuditRepository,
    PreferenceRepository, RepositoryError, ResourceRepository, UserRepository,
};

#[derive(Default)]
pub struct InMemoryApprovalRepository {
    approvals: RwLock<HashMap<String, ApprovalRequest>>,
}

#[async_trait::async_trait]
impl ApprovalRepository for InMemoryApprovalRepository {
    async fn find_by_id(
        &self,
        id: &ApprovalId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let approvals = self.approvals.read().await;
        Ok(approvals.get(&id.0).cloned())
    }

    async fn insert(&self, approval: ApprovalRequest) -> Result<(), RepositoryError> {
        let mut approvals = self.approvals.write().await;
        if approvals.contains_key(&approval.id.0) {
            return Err(RepositoryError::Conflict(format!("approval {}", approval.id)));
        }
        approvals.insert(approval.id.0.clone(), approval);
        Ok(())
    }

    async fn list(&self, filter: &ApprovalFilter) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let approvals = self.approvals.read().await;
        let mut matching: Vec<ApprovalRequest> =
            approvals.values().filter(|approval| filter.matches(approval)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            matching.truncate(limit as usize);
        }
        Ok(matching)
    }

    async fn record_review(
        &self,
        id: &ApprovalId,
        decision: ReviewDecision,
        reviewer: &UserId,
        comment: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut approvals = self.approvals.write().await;
        let Some(approval) = approvals.get_mut(&id.0) else {
            return Ok(false);
        };
        Ok(approval.review(decision, reviewer.clone(), comment.map(str::to_string), at).is_ok())
    }

    async fn reopen(&self, id: &ApprovalId, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let mut approvals = self.approvals.write().await;
        match approvals.get_mut(&id.0) {
            Some(approval) if !approval.is_pending() => {
                approval.reopen(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryResourceRepository {
    documents: RwLock<HashMap<(ResourceKind, String), Value>>,
}

#[async_trait::async_trait]
impl ResourceRepository for InMemoryResourceRepository {
    async fn find(
        &self,
        kind: ResourceKind,
        id: &ResourceId,
    ) -> Result<Option<Value>, RepositoryError> {
        let documents = self.documents.read().await;
        Ok(documents.get(&(kind, id.0.clone())).cloned())
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<Value>, RepositoryError> {
        let documents = self.documents.read().await;
        let mut listed: Vec<Value> = documents
            .iter()
            .filter(|((document_kind, _), _)| *document_kind == kind)
            .map(|(_, document)| document.clone())
            .collect();
        listed.sort_by(|a, b| {
            document_field(b, "createdAt")
                .cmp(&document_field(a, "createdAt"))
                .then_with(|| document_field(a, "id").cmp(&document_field(b, "id")))
        });
        Ok(listed)
    }

    async fn insert(&self, kind: ResourceKind, document: Value) -> Result<(), RepositoryError> {
        let id = document_id(&document)?;
        let mut documents = self.documents.write().await;
        if documents.contains_key(&(kind, id.clone())) {
            return Err(RepositoryError::Conflict(format!("{kind} {id}")));
        }
        documents.insert((kind, id), document);
        Ok(())
    }

    async fn replace(&self, kind: ResourceKind, document: Value) -> Result<bool, RepositoryError> {
        let id = document_id(&document)?;
        let mut documents = self.documents.write().await;
        match documents.get_mut(&(kind, id)) {
            Some(existing) => {
                *existing = document;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, kind: ResourceKind, id: &ResourceId) -> Result<bool, RepositoryError> {
        let mut documents = self.documents.write().await;
        Ok(documents.remove(&(kind, id.0.clone())).is_some())
    }

    async fn payments_for_reservation(
        &self,
        reservation_id: &ResourceId,
    ) -> Result<Vec<Payment>, RepositoryError> {
        let documents = self.documents.read().await;
        documents
            .iter()
            .filter(|((kind, _), document)| {
                *kind == ResourceKind::Payment
                    && document.get("reservationId").and_then(Value::as_str)
                        == Some(reservation_id.0.as_str())
            })
            .map(|(_, document)| {
                serde_json::from_value::<Payment>(document.clone())
                    .map_err(|e| RepositoryError::Decode(e.to_string()))
            })
            .collect()
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
    sessions: RwLock<HashMap<String, (UserId, DateTime<Utc>)>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn find_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(ids.iter().filter_map(|id| users.get(&id.0).cloned()).collect())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        let email = email.trim();
        Ok(users.values().find(|user| user.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user);
        Ok(())
    }

    async fn create_session(
        &self,
        user_id: &UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(token_hash.to_string(), (user_id.clone(), expires_at));
        Ok(())
    }

    async fn find_by_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError> {
        let owner = {
            let sessions = self.sessions.read().await;
            sessions
                .get(token_hash)
                .filter(|(_, expires_at)| *expires_at > now)
                .map(|(user_id, _)| user_id.clone())
        };

        match owner {
            Some(user_id) => self.find_by_id(&user_id).await,
            None => Ok(None),
        }
    }
}

#[derive(Default)]
pub struct InMemoryPreferenceRepository {
    preferences: RwLock<HashMap<String, WidgetPreferences>>,
}

#[async_trait::async_trait]
impl PreferenceRepository for InMemoryPreferenceRepository {
    async fn widgets(
        &self,
        user_id: &UserId,
    ) -> Result<Option<WidgetPreferences>, RepositoryError> {
        let preferences = self.preferences.read().await;
        Ok(preferences.get(&user_id.0).cloned())
    }

    async fn save_widgets(&self, preferences: WidgetPreferences) -> Result<(), RepositoryError> {
        let mut stored = self.preferences.write().await;
        stored.insert(preferences.user_id.0.clone(), preferences);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAuditRepository {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditRepository {
    pub async fn all(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait::async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn list_for_approval(
        &self,
        approval_id: &ApprovalId,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|event| event.approval_id.as_ref() == Some(approval_id))
            .cloned()
            .collect())
    }
}

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use bridal_core::approvals::{
    apply_fields, attachments_in, coerce_numbers, merge_attachments, money_fields, normalize,
    normalize_datetime, strip_control_keys, take_deleted_attachments,
};
use bridal_core::domain::approval::ApprovalAction;
use bridal_core::domain::attachment::Attachment;
use bridal_core::domain::reservation::{summarize_payments, Reservation};
use bridal_core::domain::resource::{canonicalize, ResourceId, ResourceKind};
use bridal_core::errors::DomainError;
use bridal_db::repositories::{RepositoryError, ResourceRepository};

use super::relocate::AttachmentRelocator;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("{kind} {id} not found")]
    ResourceNotFound { kind: ResourceKind, id: ResourceId },
    #[error("resourceId is required to {0} a resource")]
    MissingResourceId(&'static str),
    #[error("newData must be an object to {0} a resource")]
    MissingNewData(&'static str),
    #[error("{kind} {id} is not a JSON object")]
    CorruptDocument { kind: ResourceKind, id: ResourceId },
    #[error("invalid attachments: {0}")]
    InvalidAttachments(String),
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

const DATE_FIELDS: &[(ResourceKind, &str)] =
    &[(ResourceKind::Payment, "paidAt"), (ResourceKind::Cost, "incurredAt")];

fn timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn normalize_patch(kind: ResourceKind, patch: &mut Map<String, Value>) {
    if kind == ResourceKind::Reservation {
        normalize::reservation(patch);
        return;
    }

    coerce_numbers(patch, money_fields(kind));
    for (_, field) in DATE_FIELDS.iter().filter(|(owner, _)| *owner == kind) {
        if let Some(Value::String(raw)) = patch.get(*field) {
            let normalized = normalize_datetime(raw);
            patch.insert(field.to_string(), normalized);
        }
    }
}

fn reservation_of(document: &Value) -> Option<ResourceId> {
    document
        .get("reservationId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(|id| ResourceId(id.to_string()))
}

/// Applies an approved mutation to its resource collection.
#[derive(Clone)]
pub struct ActionExecutor {
    resources: Arc<dyn ResourceRepository>,
    relocator: AttachmentRelocator,
}

impl ActionExecutor {
    pub fn new(resources: Arc<dyn ResourceRepository>, relocator: AttachmentRelocator) -> Self {
        Self { resources, relocator }
    }

    /// Returns the stored document for create and edit, `None` for delete.
    pub async fn execute(
        &self,
        action: ApprovalAction,
        kind: ResourceKind,
        resource_id: Option<&ResourceId>,
        new_data: Option<&Value>,
        correlation_id: &str,
    ) -> Result<Option<Value>, ExecutionError> {
        match action {
            ApprovalAction::Delete => {
                let id = resource_id.ok_or(ExecutionError::MissingResourceId("delete"))?;
                self.delete(kind, id, correlation_id).await?;
                Ok(None)
            }
            ApprovalAction::Edit => {
                let id = resource_id.ok_or(ExecutionError::MissingResourceId("edit"))?;
                let patch = object_of(new_data).ok_or(ExecutionError::MissingNewData("edit"))?;
                self.edit(kind, id, patch, correlation_id).await.map(Some)
            }
            ApprovalAction::Create => {
                let patch = object_of(new_data).ok_or(ExecutionError::MissingNewData("create"))?;
                self.create(kind, resource_id, patch, correlation_id).await.map(Some)
            }
        }
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        id: &ResourceId,
        correlation_id: &str,
    ) -> Result<(), ExecutionError> {
        let not_found = || ExecutionError::ResourceNotFound { kind, id: id.clone() };

        let reservation = if kind == ResourceKind::Payment {
            let existing = self.resources.find(kind, id).await?.ok_or_else(not_found)?;
            reservation_of(&existing)
        } else {
            None
        };

        if !self.resources.delete(kind, id).await? {
            return Err(not_found());
        }
        info!(
            event_name = "resource.deleted",
            correlation_id,
            resource_type = %kind,
            resource_id = %id,
            "resource deleted"
        );

        if let Some(reservation_id) = reservation {
            self.refresh_after_write(&reservation_id, correlation_id).await;
        }
        Ok(())
    }

    async fn edit(
        &self,
        kind: ResourceKind,
        id: &ResourceId,
        mut patch: Map<String, Value>,
        correlation_id: &str,
    ) -> Result<Value, ExecutionError> {
        let not_found = || ExecutionError::ResourceNotFound { kind, id: id.clone() };
        let existing = self.resources.find(kind, id).await?.ok_or_else(not_found)?;
        let previous_reservation = reservation_of(&existing);
        let Value::Object(document) = existing else {
            return Err(ExecutionError::CorruptDocument { kind, id: id.clone() });
        };

        let deleted = take_deleted_attachments(&mut patch);
        strip_control_keys(&mut patch);
        normalize_patch(kind, &mut patch);

        let submitted = if patch.contains_key("attachments") {
            Some(attachments_in(&patch).map_err(invalid_attachments)?)
        } else {
            None
        };
        let current = if kind.merges_attachments() && (submitted.is_some() || !deleted.is_empty()) {
            Some(attachments_in(&document).map_err(invalid_attachments)?)
        } else {
            None
        };

        // Staged files are only moved once the edited document is known to be valid.
        let edited = EditedDocument { kind, document: &document, patch: &patch, current, deleted };
        edited.build(submitted.clone())?;
        let relocated = match submitted {
            Some(added) => Some(self.relocator.relocate(kind, added, correlation_id).await),
            None => None,
        };
        let stored = edited.build(relocated)?;

        if !self.resources.replace(kind, stored.clone()).await? {
            return Err(not_found());
        }
        info!(
            event_name = "resource.updated",
            correlation_id,
            resource_type = %kind,
            resource_id = %id,
            "resource updated"
        );

        if kind == ResourceKind::Payment {
            let current_reservation = reservation_of(&stored);
            if let Some(reservation_id) = &current_reservation {
                self.refresh_after_write(reservation_id, correlation_id).await;
            }
            if let Some(reservation_id) = previous_reservation {
                if Some(&reservation_id) != current_reservation.as_ref() {
                    self.refresh_after_write(&reservation_id, correlation_id).await;
                }
            }
        }

        Ok(stored)
    }

    async fn create(
        &self,
        kind: ResourceKind,
        requested_id: Option<&ResourceId>,
        mut patch: Map<String, Value>,
        correlation_id: &str,
    ) -> Result<Value, ExecutionError> {
        take_deleted_attachments(&mut patch);
        strip_control_keys(&mut patch);
        normalize_patch(kind, &mut patch);

        let id = requested_id
            .map(|id| id.0.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = timestamp();
        patch.insert("id".to_string(), Value::String(id.clone()));
        patch.insert("createdAt".to_string(), now.clone());
        patch.insert("updatedAt".to_string(), now);

        let mut stored = canonicalize(kind, Value::Object(patch.clone()))?;
        if patch.contains_key("attachments") {
            let added = attachments_in(&patch).map_err(invalid_attachments)?;
            let relocated = self.relocator.relocate(kind, added, correlation_id).await;
            patch.insert("attachments".to_string(), attachments_value(&relocated)?);
            stored = canonicalize(kind, Value::Object(patch))?;
        }

        self.resources.insert(kind, stored.clone()).await?;
        info!(
            event_name = "resource.created",
            correlation_id,
            resource_type = %kind,
            resource_id = %id,
            "resource created"
        );

        if kind == ResourceKind::Payment {
            if let Some(reservation_id) = reservation_of(&stored) {
                self.refresh_after_write(&reservation_id, correlation_id).await;
            }
        }

        Ok(stored)
    }

    /// The payment write already happened, so a reservation that cannot be
    /// recomputed is logged and left as it was.
    async fn refresh_after_write(&self, reservation_id: &ResourceId, correlation_id: &str) {
        if let Err(error) = self.refresh_payment_status(reservation_id, correlation_id).await {
            warn!(
                event_name = "reservation.payment_status.refresh_failed",
                correlation_id,
                reservation_id = %reservation_id,
                error = %error,
                "reservation payment status left stale"
            );
        }
    }

    /// Recomputes `amountPaid` and `paymentStatus` from the payments currently
    /// recorded against the reservation.
    async fn refresh_payment_status(
        &self,
        reservation_id: &ResourceId,
        correlation_id: &str,
    ) -> Result<(), ExecutionError> {
        let Some(document) = self.resources.find(ResourceKind::Reservation, reservation_id).await?
        else {
            warn!(
                event_name = "reservation.payment_status.missing_reservation",
                correlation_id,
                reservation_id = %reservation_id,
                "payment references an unknown reservation"
            );
            return Ok(());
        };

        let mut reservation: Reservation = serde_json::from_value(document).map_err(|error| {
            DomainError::InvalidDocument { kind: "reservation", message: error.to_string() }
        })?;
        let payments = self.resources.payments_for_reservation(reservation_id).await?;
        let summary = summarize_payments(reservation.total, &payments);

        reservation.amount_paid = summary.amount_paid;
        reservation.payment_status = summary.status;
        reservation.updated_at = Utc::now();

        let stored = serde_json::to_value(&reservation).map_err(|error| {
            DomainError::InvalidDocument { kind: "reservation", message: error.to_string() }
        })?;
        self.resources.replace(ResourceKind::Reservation, stored).await?;
        info!(
            event_name = "reservation.payment_status.recomputed",
            correlation_id,
            reservation_id = %reservation_id,
            amount_paid = %summary.amount_paid,
            payment_status = summary.status.as_str(),
            "reservation payment status recomputed"
        );
        Ok(())
    }
}

fn object_of(value: Option<&Value>) -> Option<Map<String, Value>> {
    match value {
        Some(Value::Object(map)) => Some(map.clone()),
        _ => None,
    }
}

/// An edit of one stored document, rebuilt for a given set of submitted
/// attachments.
struct EditedDocument<'a> {
    kind: ResourceKind,
    document: &'a Map<String, Value>,
    patch: &'a Map<String, Value>,
    current: Option<Vec<Attachment>>,
    deleted: Vec<String>,
}

impl EditedDocument<'_> {
    fn build(&self, submitted: Option<Vec<Attachment>>) -> Result<Value, ExecutionError> {
        let mut patch = self.patch.clone();
        let attachments = match &self.current {
            Some(current) => {
                Some(merge_attachments(current.clone(), &self.deleted, submitted.unwrap_or_default()))
            }
            None => submitted,
        };
        if let Some(attachments) = attachments {
            patch.insert("attachments".to_string(), attachments_value(&attachments)?);
        }

        let mut document = self.document.clone();
        apply_fields(&mut document, patch);
        document.insert("updatedAt".to_string(), timestamp());
        Ok(canonicalize(self.kind, Value::Object(document))?)
    }
}

fn invalid_attachments(error: serde_json::Error) -> ExecutionError {
    ExecutionError::InvalidAttachments(error.to_string())
}

fn attachments_value(attachments: &[Attachment]) -> Result<Value, ExecutionError> {
    serde_json::to_value(attachments).map_err(invalid_attachments)
}

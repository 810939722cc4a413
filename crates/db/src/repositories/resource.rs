use serde_json::Value;
use sqlx::Row;

use bridal_core::domain::payment::Payment;
use bridal_core::domain::resource::{ResourceId, ResourceKind};

use super::{document_id, document_field, RepositoryError, ResourceRepository};
use crate::DbPool;

pub struct SqlResourceRepository {
    pool: DbPool,
}

impl SqlResourceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Value, RepositoryError> {
    let raw: String = row.try_get("document").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn encode(document: &Value) -> Result<String, RepositoryError> {
    serde_json::to_string(document).map_err(|e| RepositoryError::Decode(e.to_string()))
}

/// Payments are indexed by the reservation they pay for.
fn reservation_ref(document: &Value) -> Option<String> {
    document
        .get("reservationId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[async_trait::async_trait]
impl ResourceRepository for SqlResourceRepository {
    async fn find(
        &self,
        kind: ResourceKind,
        id: &ResourceId,
    ) -> Result<Option<Value>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT document FROM {} WHERE id = ?", kind.table()))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<Value>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT document FROM {} ORDER BY created_at DESC, id ASC",
            kind.table()
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_document).collect()
    }

    async fn insert(&self, kind: ResourceKind, document: Value) -> Result<(), RepositoryError> {
        let id = document_id(&document)?;
        let body = encode(&document)?;
        let created_at = document_field(&document, "createdAt");
        let updated_at = document_field(&document, "updatedAt");

        let result = if kind == ResourceKind::Payment {
            sqlx::query(
                "INSERT INTO payment (id, reservation_id, document, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(reservation_ref(&document))
            .bind(&body)
            .bind(&created_at)
            .bind(&updated_at)
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(&format!(
                "INSERT INTO {} (id, document, created_at, updated_at) VALUES (?, ?, ?, ?)",
                kind.table()
            ))
            .bind(&id)
            .bind(&body)
            .bind(&created_at)
            .bind(&updated_at)
            .execute(&self.pool)
            .await
        };

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                Err(RepositoryError::Conflict(format!("{kind} {id}")))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn replace(&self, kind: ResourceKind, document: Value) -> Result<bool, RepositoryError> {
        let id = document_id(&document)?;
        let body = encode(&document)?;
        let updated_at = document_field(&document, "updatedAt");

        let result = if kind == ResourceKind::Payment {
            sqlx::query(
                "UPDATE payment SET reservation_id = ?, document = ?, updated_at = ? WHERE id = ?",
            )
            .bind(reservation_ref(&document))
            .bind(&body)
            .bind(&updated_at)
            .bind(&id)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(&format!(
                "UPDATE {} SET document = ?, updated_at = ? WHERE id = ?",
                kind.table()
            ))
            .bind(&body)
            .bind(&updated_at)
            .bind(&id)
            .execute(&self.pool)
            .await?
        };

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, kind: ResourceKind, id: &ResourceId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", kind.table()))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn payments_for_reservation(
        &self,
        reservation_id: &ResourceId,
    ) -> Result<Vec<Payment>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT document FROM payment WHERE reservation_id = ? ORDER BY created_at ASC",
        )
        .bind(&reservation_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let document = row_to_document(row)?;
                serde_json::from_value::<Payment>(document)
                    .map_err(|e| RepositoryError::Decode(e.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use bridal_core::domain::resource::{ResourceId, ResourceKind};

    use super::SqlResourceRepository;
    use crate::repositories::{RepositoryError, ResourceRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlResourceRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlResourceRepository::new(pool)
    }

    fn payment(id: &str, reservation: &str, amount: u32) -> serde_json::Value {
        json!({
            "id": id,
            "reservationId": reservation,
            "amount": amount,
            "method": "cash",
            "paymentType": "advance",
            "paidAt": "2026-05-02T09:00:00Z",
            "attachments": [],
            "createdAt": "2026-05-02T09:00:00Z",
            "updatedAt": "2026-05-02T09:00:00Z"
        })
    }

    #[tokio::test]
    async fn item_documents_live_in_product_table() {
        let repo = setup().await;
        let product = json!({
            "id": "prod-1",
            "name": "Robe sirène ivoire",
            "rentalPrice": 1800,
            "createdAt": "2026-01-10T10:00:00Z",
            "updatedAt": "2026-01-10T10:00:00Z"
        });

        repo.insert(ResourceKind::Item, product.clone()).await.expect("insert");

        let found = repo
            .find(ResourceKind::Item, &ResourceId("prod-1".to_string()))
            .await
            .expect("find");
        assert_eq!(found, Some(product));
        assert!(repo
            .find(ResourceKind::Customer, &ResourceId("prod-1".to_string()))
            .await
            .expect("find other kind")
            .is_none());
    }

    #[tokio::test]
    async fn replace_and_delete_report_missing_documents() {
        let repo = setup().await;
        let missing = json!({ "id": "cost-404", "createdAt": "", "updatedAt": "" });

        assert!(!repo.replace(ResourceKind::Cost, missing).await.expect("replace"));
        assert!(!repo
            .delete(ResourceKind::Cost, &ResourceId("cost-404".to_string()))
            .await
            .expect("delete"));
    }

    #[tokio::test]
    async fn duplicate_ids_conflict() {
        let repo = setup().await;
        repo.insert(ResourceKind::Payment, payment("pay-1", "res-1", 100)).await.expect("insert");

        let error =
            repo.insert(ResourceKind::Payment, payment("pay-1", "res-1", 100)).await.unwrap_err();
        assert!(matches!(error, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn payments_follow_their_reservation_column() {
        let repo = setup().await;
        repo.insert(ResourceKind::Payment, payment("pay-1", "res-1", 100)).await.expect("p1");
        repo.insert(ResourceKind::Payment, payment("pay-2", "res-2", 200)).await.expect("p2");

        // moving a payment to another reservation re-indexes it
        assert!(repo
            .replace(ResourceKind::Payment, payment("pay-2", "res-1", 250))
            .await
            .expect("replace"));

        let payments = repo
            .payments_for_reservation(&ResourceId("res-1".to_string()))
            .await
            .expect("payments");
        assert_eq!(payments.len(), 2);
        assert!(repo
            .payments_for_reservation(&ResourceId("res-2".to_string()))
            .await
            .expect("payments")
            .is_empty());
    }

    #[tokio::test]
    async fn list_returns_every_document_of_a_kind() {
        let repo = setup().await;
        repo.insert(ResourceKind::Payment, payment("pay-1", "res-1", 100)).await.expect("p1");
        repo.insert(ResourceKind::Payment, payment("pay-2", "res-1", 100)).await.expect("p2");

        let listed = repo.list(ResourceKind::Payment).await.expect("list");
        assert_eq!(listed.len(), 2);
        assert!(repo.list(ResourceKind::Reservation).await.expect("list").is_empty());
    }
}

use sqlx::Executor;

use bridal_core::domain::resource::{canonicalize, ResourceId, ResourceKind};

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, ResourceRepository, SqlResourceRepository};

/// Plain-text session tokens created by the demo dataset.
pub const DEMO_ADMIN_TOKEN: &str = "demo-admin-session";
pub const DEMO_EMPLOYEE_TOKEN: &str = "demo-employee-session";

const SEED_USERS: &[(&str, &str)] =
    &[("u-demo-admin", "admin@atelier.example"), ("u-demo-employee", "employee@atelier.example")];

const SEED_RESOURCES: &[(ResourceKind, &str)] = &[
    (ResourceKind::Customer, "c-demo-1"),
    (ResourceKind::Item, "prod-demo-1"),
    (ResourceKind::Reservation, "res-demo-1"),
    (ResourceKind::Payment, "pay-demo-1"),
    (ResourceKind::Cost, "cost-demo-1"),
];

/// Demo users, sessions and one document per resource kind, for local runs
/// and smoke tests.
pub struct DemoDataset;

impl DemoDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(Self::SQL).await?;
        tx.commit().await?;

        Ok(SeedResult {
            users: SEED_USERS.iter().map(|(_, email)| *email).collect(),
            sessions: vec![
                ("admin@atelier.example", DEMO_ADMIN_TOKEN),
                ("employee@atelier.example", DEMO_EMPLOYEE_TOKEN),
            ],
            resources: SEED_RESOURCES.len(),
        })
    }

    /// Checks every seeded row exists and every seeded document is still a
    /// valid resource of its kind.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for (id, email) in SEED_USERS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM app_user WHERE id = ?1 AND email = ?2)",
            )
            .bind(id)
            .bind(email)
            .fetch_one(pool)
            .await?;
            checks.push((format!("user {id}"), exists == 1));

            let sessions: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM user_session WHERE user_id = ?1")
                    .bind(id)
                    .fetch_one(pool)
                    .await?;
            checks.push((format!("session {id}"), sessions >= 1));
        }

        let resources = SqlResourceRepository::new(pool.clone());
        for (kind, id) in SEED_RESOURCES {
            let document = resources.find(*kind, &ResourceId(id.to_string())).await?;
            let valid = document.map(|document| canonicalize(*kind, document).is_ok());
            checks.push((format!("{kind} {id}"), valid == Some(true)));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub users: Vec<&'static str>,
    pub sessions: Vec<(&'static str, &'static str)>,
    pub resources: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(String, bool)>,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use bridal_core::domain::user::hash_session_token;

    use super::{DemoDataset, DEMO_ADMIN_TOKEN, DEMO_EMPLOYEE_TOKEN};
    use crate::repositories::{SqlUserRepository, UserRepository};
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!DemoDataset::SQL.is_empty());
    }

    #[tokio::test]
    async fn verify_seed_contract_and_idempotency() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = DemoDataset::load(&pool).await.expect("load seed fixtures");
        let first_verification = DemoDataset::verify(&pool).await.expect("verify seed fixtures");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.resources, 5);

        DemoDataset::load(&pool).await.expect("reload seed fixtures");
        let second_verification = DemoDataset::verify(&pool).await.expect("re-verify");
        assert!(second_verification.all_present);
        assert_eq!(first_verification.checks, second_verification.checks);
    }

    #[tokio::test]
    async fn seeded_tokens_resolve_to_their_users() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        DemoDataset::load(&pool).await.expect("load seed fixtures");

        let users = SqlUserRepository::new(pool);
        let admin = users
            .find_by_session(&hash_session_token(DEMO_ADMIN_TOKEN), Utc::now())
            .await
            .expect("lookup")
            .expect("admin session");
        assert!(admin.is_admin());

        let employee = users
            .find_by_session(&hash_session_token(DEMO_EMPLOYEE_TOKEN), Utc::now())
            .await
            .expect("lookup")
            .expect("employee session");
        assert!(!employee.is_admin());
    }
}

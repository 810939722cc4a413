use bridal_core::config::{AppConfig, ConfigError, StorageBackend};
use bridal_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::state::AppState;
use crate::storage::{self, StorageError};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("blob storage setup failed: {0}")]
    Storage(#[source] StorageError),
}

pub fn storage_backend_name(config: &AppConfig) -> &'static str {
    match config.storage.backend {
        StorageBackend::Local => "local",
        StorageBackend::Memory => "memory",
        StorageBackend::Remote => "remote",
    }
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let blobs = storage::from_config(&config.storage).map_err(BootstrapError::Storage)?;
    info!(
        event_name = "system.bootstrap.storage_ready",
        correlation_id = "bootstrap",
        backend = storage_backend_name(&config),
        "blob storage ready"
    );

    let state = AppState::from_pool(config.clone(), db_pool.clone(), blobs);
    Ok(Application { config, db_pool, state })
}

#[cfg(test)]
mod tests {
    use bridal_core::config::{AppConfig, ConfigOverrides, LoadOptions, StorageBackend};

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?).await
    }

    fn memory_options(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                storage_backend: Some(StorageBackend::Memory),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_builds_state() {
        let app = bootstrap(memory_options("sqlite::memory:")).await.expect("bootstrap");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('approval_request', 'user_session', 'payment', 'audit_event')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("tables");
        assert_eq!(table_count, 4);

        let approvals =
            app.state.approvals.list(&Default::default()).await.expect("empty approval store");
        assert!(approvals.is_empty());

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn remote_storage_without_token_fails_fast() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                storage_backend: Some(StorageBackend::Remote),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("missing token should fail").to_string();
        assert!(message.contains("token"), "{message}");
    }
}

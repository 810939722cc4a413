use std::sync::Arc;

use bridal_core::config::AppConfig;
use bridal_db::repositories::{
    ApprovalRepository, AuditRepository, PreferenceRepository, ResourceRepository,
    SqlApprovalRepository, SqlAuditRepository, SqlPreferenceRepository, SqlResourceRepository,
    SqlUserRepository, UserRepository,
};
use bridal_db::DbPool;

use crate::approvals::{ActionExecutor, AttachmentRelocator, ReviewGate};
use crate::storage::BlobStore;

/// Shared handles every route needs.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub approvals: Arc<dyn ApprovalRepository>,
    pub resources: Arc<dyn ResourceRepository>,
    pub users: Arc<dyn UserRepository>,
    pub preferences: Arc<dyn PreferenceRepository>,
    pub audit: Arc<dyn AuditRepository>,
    pub blobs: Arc<dyn BlobStore>,
}

impl AppState {
    pub fn from_pool(config: AppConfig, pool: DbPool, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            config: Arc::new(config),
            approvals: Arc::new(SqlApprovalRepository::new(pool.clone())),
            resources: Arc::new(SqlResourceRepository::new(pool.clone())),
            users: Arc::new(SqlUserRepository::new(pool.clone())),
            preferences: Arc::new(SqlPreferenceRepository::new(pool.clone())),
            audit: Arc::new(SqlAuditRepository::new(pool)),
            blobs,
        }
    }

    #[cfg(test)]
    pub fn in_memory(config: AppConfig, blobs: Arc<dyn BlobStore>) -> Self {
        use bridal_db::repositories::{
            InMemoryApprovalRepository, InMemoryAuditRepository, InMemoryPreferenceRepository,
            InMemoryResourceRepository, InMemoryUserRepository,
        };

        Self {
            config: Arc::new(config),
            approvals: Arc::new(InMemoryApprovalRepository::default()),
            resources: Arc::new(InMemoryResourceRepository::default()),
            users: Arc::new(InMemoryUserRepository::default()),
            preferences: Arc::new(InMemoryPreferenceRepository::default()),
            audit: Arc::new(InMemoryAuditRepository::default()),
            blobs,
        }
    }

    pub fn relocator(&self) -> AttachmentRelocator {
        AttachmentRelocator::new(self.blobs.clone(), self.config.storage.approvals_prefix.clone())
    }

    pub fn executor(&self) -> ActionExecutor {
        ActionExecutor::new(self.resources.clone(), self.relocator())
    }

    pub fn review_gate(&self) -> ReviewGate {
        ReviewGate::new(
            self.approvals.clone(),
            self.users.clone(),
            self.audit.clone(),
            self.executor(),
        )
    }
}

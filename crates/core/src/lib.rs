pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;

pub use audit::{AuditEvent, AuditOutcome};
pub use domain::approval::{
    ApprovalAction, ApprovalId, ApprovalRequest, ApprovalStatus, NewApproval, ReviewDecision,
};
pub use domain::attachment::{Attachment, FileCategory};
pub use domain::resource::{ResourceId, ResourceKind};
pub use domain::user::{User, UserId, UserRef, UserRole};
pub use errors::{ApplicationError, DomainError, InterfaceError};

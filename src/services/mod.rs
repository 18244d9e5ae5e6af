//! # Collaborator Contracts
//!
//! Interfaces the lifecycle core consumes but does not own: the audit-log
//! sink, the role/permission check and the PM scheduling queue. Each comes
//! with a small implementation good enough for local runs and tests.

pub mod audit;
pub mod permissions;
pub mod pm_scheduler;

pub use audit::{AuditEntry, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use permissions::{Action, Actor, AllowAll, Permission, PermissionCheck, Role, RolePolicy};
pub use pm_scheduler::{NextPmOccurrence, PmQueue, PmScheduler};

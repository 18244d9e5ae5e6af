//! # Orchestration
//!
//! The cross-entity lifecycle core. Each component owns one slice of the
//! lifecycle and plans its writes through the state machines; all of them
//! share an [`OrchestrationContext`].
//!
//! ## Components
//!
//! - [`ServiceOrderManager`] - opening, advancing, replacing, cancelling orders
//! - [`RepairOrchestrator`] - repair tickets and QC outcomes
//! - [`DeliveryReturnCoordinator`] - courier/self delivery and pickup/disposal
//! - [`PmConflictGuard`] - preventive maintenance lifecycle and conflicts
//! - [`OnSiteApprovalGate`] - approval of on-site repair
//! - [`AutoScheduler`] - background scheduling of routine PM occurrences
//!
//! Cassette status is changed only through
//! [`CassetteStateTracker`](crate::state_machine::CassetteStateTracker).

pub mod auto_scheduler;
pub mod core;
pub mod delivery_coordinator;
pub mod on_site_gate;
pub mod pm_guard;
pub mod repair_orchestrator;
pub mod service_order_manager;

pub use auto_scheduler::{AutoScheduler, SchedulingCycle};
pub use core::{LockedCassettes, OrchestrationContext, OrchestrationCore};
pub use delivery_coordinator::DeliveryReturnCoordinator;
pub use on_site_gate::OnSiteApprovalGate;
pub use pm_guard::PmConflictGuard;
pub use repair_orchestrator::RepairOrchestrator;
pub use service_order_manager::ServiceOrderManager;

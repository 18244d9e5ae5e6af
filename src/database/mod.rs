//! # Database Operations
//!
//! Persistence boundary for the lifecycle core.
//!
//! ## Overview
//!
//! Every lifecycle operation runs inside exactly one [`UnitOfWork`]: it locks
//! the rows it is about to evaluate, plans its effects, applies them and
//! commits. Dropping a unit of work without committing rolls it back, so an
//! `Err` anywhere in planning leaves storage untouched.
//!
//! ## Key Components
//!
//! - [`connection`] - PostgreSQL pool setup, statement timeout and migrations
//! - [`postgres`] - [`Store`] backed by `sqlx` transactions with `FOR UPDATE` row locks
//! - [`in_memory`] - [`Store`] with the same semantics over a process-local mutex,
//!   used by tests and local runs
//!
//! ## Locking
//!
//! `lock_*` methods take a row lock (or the equivalent) before returning the
//! row, so status checks made on the returned value cannot race another
//! operation. Cassettes are always locked in ascending id order.

pub mod connection;
pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Cassette, Delivery, OrderTransition, PreventiveMaintenance, RepairTicket, ReturnRecord,
    ServiceOrder,
};
use crate::state_machine::states::{CassetteStatus, OrderStatus, RepairLocation};

pub use connection::DatabaseConnection;
pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Source of units of work
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a new transaction
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    async fn health_check(&self) -> Result<()>;

    /// Short backend name for logs and the health endpoint
    fn backend(&self) -> &'static str;
}

/// One transaction against the lifecycle tables.
///
/// Soft-deleted service orders and PM tasks are invisible to `find_*`/`lock_*`.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Next value of the `prefix` counter for `day`, starting at 1. The
    /// counter row stays locked until the unit of work ends.
    async fn next_document_sequence(&mut self, prefix: &str, day: NaiveDate) -> Result<u32>;

    // Cassettes

    /// Lock every cassette in `ids`; `NotFound` if any id is unknown
    async fn lock_cassettes(&mut self, ids: &[Uuid]) -> Result<Vec<Cassette>>;
    async fn find_cassette(&mut self, id: Uuid) -> Result<Option<Cassette>>;
    async fn update_cassette_status(
        &mut self,
        id: Uuid,
        status: CassetteStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;

    // Service orders

    async fn insert_order(&mut self, order: &ServiceOrder) -> Result<()>;
    async fn lock_order(&mut self, id: Uuid) -> Result<Option<ServiceOrder>>;
    async fn find_order(&mut self, id: Uuid) -> Result<Option<ServiceOrder>>;
    /// Non-deleted, non-`CLOSED` orders referencing any of the cassettes,
    /// either as an original detail or as a bound replacement
    async fn open_orders_for_cassettes(&mut self, cassette_ids: &[Uuid])
        -> Result<Vec<ServiceOrder>>;
    async fn update_order_status(
        &mut self,
        id: Uuid,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;
    async fn update_order_location(
        &mut self,
        id: Uuid,
        location: RepairLocation,
        at: DateTime<Utc>,
    ) -> Result<()>;
    async fn record_on_site_rejection(
        &mut self,
        id: Uuid,
        reason: Option<&str>,
        rejected_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()>;
    async fn soft_delete_order(
        &mut self,
        id: Uuid,
        reason: &str,
        actor_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()>;
    async fn bind_replacement(&mut self, detail_id: Uuid, replacement_id: Uuid) -> Result<()>;
    /// Append a transition; `sort_key` and `most_recent` are assigned here
    async fn insert_order_transition(&mut self, transition: &OrderTransition) -> Result<()>;
    async fn order_transitions(&mut self, order_id: Uuid) -> Result<Vec<OrderTransition>>;

    // Repair tickets

    async fn insert_repair_ticket(&mut self, ticket: &RepairTicket) -> Result<()>;
    async fn lock_repair_ticket(&mut self, id: Uuid) -> Result<Option<RepairTicket>>;
    async fn find_repair_ticket(&mut self, id: Uuid) -> Result<Option<RepairTicket>>;
    /// Non-voided tickets of the order
    async fn repair_tickets_for_order(&mut self, order_id: Uuid) -> Result<Vec<RepairTicket>>;
    async fn active_repair_tickets_for_cassettes(
        &mut self,
        cassette_ids: &[Uuid],
    ) -> Result<Vec<RepairTicket>>;
    async fn update_repair_ticket(&mut self, ticket: &RepairTicket) -> Result<()>;
    async fn void_repair_tickets(&mut self, order_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    // Delivery / return

    async fn find_delivery(&mut self, order_id: Uuid) -> Result<Option<Delivery>>;
    /// Insert or replace the delivery of `delivery.order_id`
    async fn save_delivery(&mut self, delivery: &Delivery) -> Result<()>;
    async fn find_return(&mut self, order_id: Uuid) -> Result<Option<ReturnRecord>>;
    async fn insert_return(&mut self, record: &ReturnRecord) -> Result<()>;

    // Preventive maintenance

    async fn insert_pm(&mut self, pm: &PreventiveMaintenance) -> Result<()>;
    async fn lock_pm(&mut self, id: Uuid) -> Result<Option<PreventiveMaintenance>>;
    async fn find_pm(&mut self, id: Uuid) -> Result<Option<PreventiveMaintenance>>;
    async fn active_pms_for_cassettes(
        &mut self,
        cassette_ids: &[Uuid],
    ) -> Result<Vec<PreventiveMaintenance>>;
    /// Persist header fields, detail rows and soft-delete marker
    async fn update_pm(&mut self, pm: &PreventiveMaintenance) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

//! # In-Memory Store
//!
//! [`Store`] implementation over a process-local table set, for tests and
//! local runs without PostgreSQL.
//!
//! A unit of work holds the store mutex for its whole lifetime and mutates a
//! working copy of the tables. `commit` writes the copy back; dropping the
//! unit of work discards it. Holding the mutex serialises units of work,
//! which is a stricter form of the row locks the PostgreSQL store takes.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, UnitOfWork};
use crate::error::{CassetteError, Result};
use crate::models::{
    Cassette, Delivery, OrderTransition, PreventiveMaintenance, RepairTicket, ReturnRecord,
    ServiceOrder,
};
use crate::state_machine::states::{CassetteStatus, OrderStatus, RepairLocation};

/// Table set shared by all units of work of one store
#[derive(Debug, Default, Clone)]
pub struct MemoryTables {
    cassettes: BTreeMap<Uuid, Cassette>,
    orders: HashMap<Uuid, ServiceOrder>,
    transitions: Vec<OrderTransition>,
    repair_tickets: HashMap<Uuid, RepairTicket>,
    /// Keyed by order id
    deliveries: HashMap<Uuid, Delivery>,
    /// Keyed by order id
    returns: HashMap<Uuid, ReturnRecord>,
    pms: HashMap<Uuid, PreventiveMaintenance>,
    sequences: HashMap<(String, NaiveDate), u32>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<MemoryTables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a cassette record; cassettes are master data owned elsewhere
    pub async fn insert_cassette(&self, cassette: Cassette) {
        self.tables
            .lock()
            .await
            .cassettes
            .insert(cassette.cassette_id, cassette);
    }

    /// Number of committed rows per table, for test assertions
    pub async fn row_counts(&self) -> HashMap<&'static str, usize> {
        let tables = self.tables.lock().await;
        HashMap::from([
            ("cassettes", tables.cassettes.len()),
            ("service_orders", tables.orders.len()),
            ("service_order_transitions", tables.transitions.len()),
            ("repair_tickets", tables.repair_tickets.len()),
            ("deliveries", tables.deliveries.len()),
            ("returns", tables.returns.len()),
            ("preventive_maintenances", tables.pms.len()),
        ])
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork { guard, working }))
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryTables>,
    working: MemoryTables,
}

impl InMemoryUnitOfWork {
    fn live_order(&self, id: Uuid) -> Option<&ServiceOrder> {
        self.working
            .orders
            .get(&id)
            .filter(|o| o.deleted_at.is_none())
    }

    fn live_order_mut(&mut self, id: Uuid) -> Result<&mut ServiceOrder> {
        self.working
            .orders
            .get_mut(&id)
            .filter(|o| o.deleted_at.is_none())
            .ok_or_else(|| CassetteError::not_found("service_order", id))
    }

    fn live_pm(&self, id: Uuid) -> Option<&PreventiveMaintenance> {
        self.working.pms.get(&id).filter(|pm| pm.deleted_at.is_none())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn next_document_sequence(&mut self, prefix: &str, day: NaiveDate) -> Result<u32> {
        let counter = self
            .working
            .sequences
            .entry((prefix.to_string(), day))
            .or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn lock_cassettes(&mut self, ids: &[Uuid]) -> Result<Vec<Cassette>> {
        let mut sorted = ids.to_vec();
        sorted.sort();
        sorted.dedup();

        sorted
            .into_iter()
            .map(|id| {
                self.working
                    .cassettes
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| CassetteError::not_found("cassette", id))
            })
            .collect()
    }

    async fn find_cassette(&mut self, id: Uuid) -> Result<Option<Cassette>> {
        Ok(self.working.cassettes.get(&id).cloned())
    }

    async fn update_cassette_status(
        &mut self,
        id: Uuid,
        status: CassetteStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let cassette = self
            .working
            .cassettes
            .get_mut(&id)
            .ok_or_else(|| CassetteError::not_found("cassette", id))?;
        cassette.status = status;
        cassette.updated_at = at;
        Ok(())
    }

    async fn insert_order(&mut self, order: &ServiceOrder) -> Result<()> {
        if self
            .working
            .orders
            .values()
            .any(|o| o.ticket_number == order.ticket_number)
        {
            return Err(CassetteError::conflict(format!(
                "Ticket number {} already exists",
                order.ticket_number
            )));
        }
        self.working.orders.insert(order.order_id, order.clone());
        Ok(())
    }

    async fn lock_order(&mut self, id: Uuid) -> Result<Option<ServiceOrder>> {
        Ok(self.live_order(id).cloned())
    }

    async fn find_order(&mut self, id: Uuid) -> Result<Option<ServiceOrder>> {
        Ok(self.live_order(id).cloned())
    }

    async fn open_orders_for_cassettes(
        &mut self,
        cassette_ids: &[Uuid],
    ) -> Result<Vec<ServiceOrder>> {
        Ok(self
            .working
            .orders
            .values()
            .filter(|o| o.deleted_at.is_none() && !o.status.is_terminal())
            .filter(|o| {
                o.referenced_cassette_ids()
                    .iter()
                    .any(|id| cassette_ids.contains(id))
            })
            .cloned()
            .collect())
    }

    async fn update_order_status(
        &mut self,
        id: Uuid,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let order = self.live_order_mut(id)?;
        order.status = status;
        order.updated_at = at;
        Ok(())
    }

    async fn update_order_location(
        &mut self,
        id: Uuid,
        location: RepairLocation,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let order = self.live_order_mut(id)?;
        order.repair_location = location;
        order.updated_at = at;
        Ok(())
    }

    async fn record_on_site_rejection(
        &mut self,
        id: Uuid,
        reason: Option<&str>,
        rejected_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let order = self.live_order_mut(id)?;
        order.rejection_reason = reason.map(str::to_string);
        order.rejected_by = Some(rejected_by);
        order.updated_at = at;
        Ok(())
    }

    async fn soft_delete_order(
        &mut self,
        id: Uuid,
        reason: &str,
        actor_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let order = self.live_order_mut(id)?;
        order.deleted_at = Some(at);
        order.cancel_reason = Some(reason.to_string());
        order.cancelled_by = Some(actor_id);
        order.updated_at = at;
        Ok(())
    }

    async fn bind_replacement(&mut self, detail_id: Uuid, replacement_id: Uuid) -> Result<()> {
        let detail = self
            .working
            .orders
            .values_mut()
            .flat_map(|o| o.details.iter_mut())
            .find(|d| d.detail_id == detail_id)
            .ok_or_else(|| CassetteError::not_found("service_order_detail", detail_id))?;
        detail.replacement_cassette_id = Some(replacement_id);
        Ok(())
    }

    async fn insert_order_transition(&mut self, transition: &OrderTransition) -> Result<()> {
        let mut next_key = 1;
        for existing in self
            .working
            .transitions
            .iter_mut()
            .filter(|t| t.order_id == transition.order_id)
        {
            existing.most_recent = false;
            next_key = next_key.max(existing.sort_key + 1);
        }

        let mut row = transition.clone();
        row.sort_key = next_key;
        row.most_recent = true;
        self.working.transitions.push(row);
        Ok(())
    }

    async fn order_transitions(&mut self, order_id: Uuid) -> Result<Vec<OrderTransition>> {
        let mut rows: Vec<OrderTransition> = self
            .working
            .transitions
            .iter()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.sort_key);
        Ok(rows)
    }

    async fn insert_repair_ticket(&mut self, ticket: &RepairTicket) -> Result<()> {
        self.working
            .repair_tickets
            .insert(ticket.repair_id, ticket.clone());
        Ok(())
    }

    async fn lock_repair_ticket(&mut self, id: Uuid) -> Result<Option<RepairTicket>> {
        self.find_repair_ticket(id).await
    }

    async fn find_repair_ticket(&mut self, id: Uuid) -> Result<Option<RepairTicket>> {
        Ok(self
            .working
            .repair_tickets
            .get(&id)
            .filter(|t| t.deleted_at.is_none())
            .cloned())
    }

    async fn repair_tickets_for_order(&mut self, order_id: Uuid) -> Result<Vec<RepairTicket>> {
        let mut tickets: Vec<RepairTicket> = self
            .working
            .repair_tickets
            .values()
            .filter(|t| t.order_id == order_id && t.deleted_at.is_none())
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.created_at);
        Ok(tickets)
    }

    async fn active_repair_tickets_for_cassettes(
        &mut self,
        cassette_ids: &[Uuid],
    ) -> Result<Vec<RepairTicket>> {
        Ok(self
            .working
            .repair_tickets
            .values()
            .filter(|t| t.is_active() && cassette_ids.contains(&t.cassette_id))
            .cloned()
            .collect())
    }

    async fn update_repair_ticket(&mut self, ticket: &RepairTicket) -> Result<()> {
        let existing = self
            .working
            .repair_tickets
            .get_mut(&ticket.repair_id)
            .ok_or_else(|| CassetteError::not_found("repair_ticket", ticket.repair_id))?;
        *existing = ticket.clone();
        Ok(())
    }

    async fn void_repair_tickets(&mut self, order_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        for ticket in self
            .working
            .repair_tickets
            .values_mut()
            .filter(|t| t.order_id == order_id && t.deleted_at.is_none())
        {
            ticket.deleted_at = Some(at);
            ticket.updated_at = at;
        }
        Ok(())
    }

    async fn find_delivery(&mut self, order_id: Uuid) -> Result<Option<Delivery>> {
        Ok(self.working.deliveries.get(&order_id).cloned())
    }

    async fn save_delivery(&mut self, delivery: &Delivery) -> Result<()> {
        self.working
            .deliveries
            .insert(delivery.order_id, delivery.clone());
        Ok(())
    }

    async fn find_return(&mut self, order_id: Uuid) -> Result<Option<ReturnRecord>> {
        Ok(self.working.returns.get(&order_id).cloned())
    }

    async fn insert_return(&mut self, record: &ReturnRecord) -> Result<()> {
        if self.working.returns.contains_key(&record.order_id) {
            return Err(CassetteError::conflict(format!(
                "Return already recorded for order {}",
                record.order_id
            )));
        }
        self.working.returns.insert(record.order_id, record.clone());
        Ok(())
    }

    async fn insert_pm(&mut self, pm: &PreventiveMaintenance) -> Result<()> {
        self.working.pms.insert(pm.pm_id, pm.clone());
        Ok(())
    }

    async fn lock_pm(&mut self, id: Uuid) -> Result<Option<PreventiveMaintenance>> {
        Ok(self.live_pm(id).cloned())
    }

    async fn find_pm(&mut self, id: Uuid) -> Result<Option<PreventiveMaintenance>> {
        Ok(self.live_pm(id).cloned())
    }

    async fn active_pms_for_cassettes(
        &mut self,
        cassette_ids: &[Uuid],
    ) -> Result<Vec<PreventiveMaintenance>> {
        Ok(self
            .working
            .pms
            .values()
            .filter(|pm| pm.is_active())
            .filter(|pm| pm.details.iter().any(|d| cassette_ids.contains(&d.cassette_id)))
            .cloned()
            .collect())
    }

    async fn update_pm(&mut self, pm: &PreventiveMaintenance) -> Result<()> {
        let existing = self
            .working
            .pms
            .get_mut(&pm.pm_id)
            .ok_or_else(|| CassetteError::not_found("preventive_maintenance", pm.pm_id))?;
        *existing = pm.clone();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewCassette;

    fn cassette() -> Cassette {
        Cassette::register(NewCassette {
            serial_number: "CST-0042".to_string(),
            type_code: "RJC".to_string(),
            bank_id: Uuid::new_v4(),
            machine_id: None,
            status: None,
        })
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_rolls_back() {
        let store = InMemoryStore::new();
        let c = cassette();
        let id = c.cassette_id;
        store.insert_cassette(c).await;

        {
            let mut uow = store.begin().await.unwrap();
            uow.update_cassette_status(id, CassetteStatus::Bad, Utc::now())
                .await
                .unwrap();
        }

        let mut uow = store.begin().await.unwrap();
        let found = uow.find_cassette(id).await.unwrap().unwrap();
        assert_eq!(found.status, CassetteStatus::Ok);
    }

    #[tokio::test]
    async fn test_commit_publishes_working_copy() {
        let store = InMemoryStore::new();
        let c = cassette();
        let id = c.cassette_id;
        store.insert_cassette(c).await;

        let mut uow = store.begin().await.unwrap();
        uow.update_cassette_status(id, CassetteStatus::Bad, Utc::now())
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let found = uow.find_cassette(id).await.unwrap().unwrap();
        assert_eq!(found.status, CassetteStatus::Bad);
    }

    #[tokio::test]
    async fn test_lock_cassettes_reports_missing_id() {
        let store = InMemoryStore::new();
        let c = cassette();
        let known = c.cassette_id;
        store.insert_cassette(c).await;

        let missing = Uuid::new_v4();
        let mut uow = store.begin().await.unwrap();
        let err = uow.lock_cassettes(&[known, missing]).await.unwrap_err();
        assert_eq!(
            err,
            CassetteError::NotFound {
                entity: "cassette",
                id: missing
            }
        );
    }

    #[tokio::test]
    async fn test_transition_sort_keys_advance() {
        let store = InMemoryStore::new();
        let order_id = Uuid::new_v4();
        let mut uow = store.begin().await.unwrap();
        for to_state in [OrderStatus::Open, OrderStatus::InDelivery] {
            uow.insert_order_transition(&OrderTransition {
                transition_id: Uuid::new_v4(),
                order_id,
                from_state: None,
                to_state,
                event: None,
                sort_key: 0,
                most_recent: true,
                actor_id: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }

        let rows = uow.order_transitions(order_id).await.unwrap();
        assert_eq!(rows.iter().map(|t| t.sort_key).collect::<Vec<_>>(), vec![1, 2]);
        assert!(!rows[0].most_recent);
        assert!(rows[1].most_recent);
    }
}

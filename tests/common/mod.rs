//! Shared harness for integration tests: an in-memory store seeded with
//! cassettes, an in-memory audit sink and the role policy.

#![allow(dead_code)]

pub mod strategies;

use std::sync::Arc;

use cassette_core::config::CoreConfig;
use cassette_core::database::InMemoryStore;
use cassette_core::models::{
    Cassette, CourierInfo, DeliveryRequest, NewCassette, NewOrderDetail, NewServiceOrder,
    PickupConfirmation, RepairCompletion, ServiceOrder,
};
use cassette_core::orchestration::{OrchestrationContext, OrchestrationCore};
use cassette_core::services::{Actor, InMemoryAuditSink, Role};
use cassette_core::state_machine::states::{CassetteStatus, OrderPriority, RepairLocation};
use uuid::Uuid;

pub struct TestHarness {
    pub core: Arc<OrchestrationCore>,
    pub store: Arc<InMemoryStore>,
    pub audit: Arc<InMemoryAuditSink>,
    pub admin: Actor,
    pub staff: Actor,
    pub pengelola: Actor,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(CoreConfig::for_tests())
    }

    pub fn with_config(config: CoreConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let context = OrchestrationContext::new(store.clone(), config).with_audit(audit.clone());

        Self {
            core: Arc::new(OrchestrationCore::from_context(context)),
            store,
            audit,
            admin: Actor::new(Uuid::new_v4(), Role::Admin),
            staff: Actor::new(Uuid::new_v4(), Role::RcStaff),
            pengelola: Actor::new(Uuid::new_v4(), Role::Pengelola),
        }
    }

    /// Register a cassette directly in the store, bypassing the tracker
    pub async fn seed_cassette(&self, status: CassetteStatus) -> Uuid {
        let cassette = Cassette::register(NewCassette {
            serial_number: format!("CST-{}", &Uuid::new_v4().simple().to_string()[..8]),
            type_code: "RB-100".to_string(),
            bank_id: Uuid::new_v4(),
            machine_id: None,
            status: Some(status),
        });
        let id = cassette.cassette_id;
        self.store.insert_cassette(cassette).await;
        id
    }

    pub async fn seed_cassettes(&self, count: usize) -> Vec<Uuid> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(self.seed_cassette(CassetteStatus::Ok).await);
        }
        ids
    }

    pub async fn cassette_status(&self, cassette_id: Uuid) -> CassetteStatus {
        self.core
            .orders
            .get_cassette(&self.admin, cassette_id)
            .await
            .expect("cassette should exist")
            .status
    }

    pub async fn order(&self, order_id: Uuid) -> ServiceOrder {
        self.core
            .orders
            .get_order(&self.admin, order_id)
            .await
            .expect("order should exist")
    }

    pub async fn open_order(&self, location: RepairLocation, cassettes: &[Uuid]) -> ServiceOrder {
        self.core
            .orders
            .open(&self.pengelola, new_order(self.pengelola.actor_id, location, cassettes))
            .await
            .expect("order should open")
    }

    /// Open an RC order and carry it through courier delivery and receipt
    pub async fn received_order(&self, cassettes: &[Uuid]) -> ServiceOrder {
        let order = self.open_order(RepairLocation::Rc, cassettes).await;
        self.core
            .deliveries
            .create_delivery(&self.pengelola, delivery_request(order.order_id, cassettes[0]))
            .await
            .expect("delivery should be recorded");
        self.core
            .deliveries
            .receive_delivery(&self.staff, order.order_id, None)
            .await
            .expect("delivery should be received");
        self.order(order.order_id).await
    }

    /// Take, start and complete every repair ticket of an order
    pub async fn repair_all(&self, order_id: Uuid, qc_passed: bool) {
        let tickets = self
            .core
            .repairs
            .repair_tickets_for_order(&self.staff, order_id)
            .await
            .expect("tickets should load");
        for ticket in tickets {
            self.core
                .repairs
                .take(&self.staff, ticket.repair_id, None)
                .await
                .expect("take");
            self.core
                .repairs
                .start(&self.staff, ticket.repair_id)
                .await
                .expect("start");
            self.core
                .repairs
                .complete(&self.staff, ticket.repair_id, completion(qc_passed))
                .await
                .expect("complete");
        }
    }
}

pub fn new_order(reporter_id: Uuid, location: RepairLocation, cassettes: &[Uuid]) -> NewServiceOrder {
    NewServiceOrder {
        reporter_id,
        repair_location: location,
        priority: OrderPriority::High,
        description: Some("Cassette jams on dispense".to_string()),
        cassettes: cassettes
            .iter()
            .map(|id| NewOrderDetail {
                cassette_id: *id,
                request_replacement: false,
                problem_notes: None,
            })
            .collect(),
    }
}

pub fn delivery_request(order_id: Uuid, cassette_id: Uuid) -> DeliveryRequest {
    DeliveryRequest {
        order_id,
        cassette_id,
        courier: CourierInfo {
            courier_name: "JNE".to_string(),
            tracking_number: Some("JNE-0001".to_string()),
            sender_name: Some("Vendor Cash Logistics".to_string()),
            notes: None,
        },
        shipped_at: None,
    }
}

pub fn completion(qc_passed: bool) -> RepairCompletion {
    RepairCompletion {
        qc_passed,
        parts_replaced: vec!["feed roller".to_string()],
        notes: Some("Replaced worn roller".to_string()),
    }
}

pub fn signed_pickup() -> PickupConfirmation {
    PickupConfirmation {
        recipient_name: Some("Budi Santoso".to_string()),
        recipient_signature: Some("data:image/png;base64,AAAA".to_string()),
        notes: None,
    }
}

//! # Service Order Model
//!
//! A reported problem referencing one or more cassettes through detail rows.
//! The order owns its details; cassettes are only referenced by id.
//!
//! Cancellation is a soft delete: `deleted_at` is set and the row disappears
//! from every lookup used by the lifecycle operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state_machine::events::OrderEvent;
use crate::state_machine::states::{OrderPriority, OrderStatus, RepairLocation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceOrder {
    pub order_id: Uuid,
    pub ticket_number: String,
    pub status: OrderStatus,
    pub repair_location: RepairLocation,
    pub priority: OrderPriority,
    pub reporter_id: Uuid,
    pub description: Option<String>,
    pub details: Vec<OrderDetail>,
    /// Set when an on-site request is turned down
    pub rejection_reason: Option<String>,
    pub rejected_by: Option<Uuid>,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One cassette referenced by an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub detail_id: Uuid,
    pub order_id: Uuid,
    pub cassette_id: Uuid,
    pub request_replacement: bool,
    pub replacement_cassette_id: Option<Uuid>,
    pub problem_notes: Option<String>,
}

/// Request to open a service order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewServiceOrder {
    pub reporter_id: Uuid,
    #[serde(default)]
    pub repair_location: RepairLocation,
    #[serde(default)]
    pub priority: OrderPriority,
    pub description: Option<String>,
    pub cassettes: Vec<NewOrderDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderDetail {
    pub cassette_id: Uuid,
    #[serde(default)]
    pub request_replacement: bool,
    pub problem_notes: Option<String>,
}

/// Persisted status change, one row per edge walked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTransition {
    pub transition_id: Uuid,
    pub order_id: Uuid,
    pub from_state: Option<OrderStatus>,
    pub to_state: OrderStatus,
    /// `None` for the creation row
    pub event: Option<OrderEvent>,
    pub sort_key: i32,
    pub most_recent: bool,
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ServiceOrder {
    /// Build a fresh `OPEN` order with generated ids under `ticket_number`
    pub fn open(request: &NewServiceOrder, ticket_number: String) -> Self {
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let details = request
            .cassettes
            .iter()
            .map(|d| OrderDetail {
                detail_id: Uuid::new_v4(),
                order_id,
                cassette_id: d.cassette_id,
                request_replacement: d.request_replacement,
                replacement_cassette_id: None,
                problem_notes: d.problem_notes.clone(),
            })
            .collect();

        Self {
            order_id,
            ticket_number,
            status: OrderStatus::Open,
            repair_location: request.repair_location,
            priority: request.priority,
            reporter_id: request.reporter_id,
            description: request.description.clone(),
            details,
            rejection_reason: None,
            rejected_by: None,
            cancel_reason: None,
            cancelled_by: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Cassettes originally reported on this order
    pub fn cassette_ids(&self) -> Vec<Uuid> {
        self.details.iter().map(|d| d.cassette_id).collect()
    }

    /// Every cassette the order currently touches, replacements included
    pub fn referenced_cassette_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.cassette_ids();
        ids.extend(self.details.iter().filter_map(|d| d.replacement_cassette_id));
        ids
    }

    pub fn detail(&self, detail_id: Uuid) -> Option<&OrderDetail> {
        self.details.iter().find(|d| d.detail_id == detail_id)
    }

    pub fn detail_mut(&mut self, detail_id: Uuid) -> Option<&mut OrderDetail> {
        self.details.iter_mut().find(|d| d.detail_id == detail_id)
    }

    pub fn detail_for_cassette(&self, cassette_id: Uuid) -> Option<&OrderDetail> {
        self.details.iter().find(|d| d.cassette_id == cassette_id)
    }

    pub fn is_cancelled(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl OrderDetail {
    /// Details flagged for replacement never get a repair ticket
    pub fn needs_repair_ticket(&self) -> bool {
        !self.request_replacement
    }

    /// The cassette handed back when the detail is settled
    pub fn returned_cassette_id(&self) -> Uuid {
        self.replacement_cassette_id.unwrap_or(self.cassette_id)
    }
}

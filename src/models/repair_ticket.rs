//! # Repair Ticket Model
//!
//! One ticket per cassette per service order. A ticket is "active" until it
//! reaches `COMPLETED`; voided tickets (from a cancelled order) carry
//! `deleted_at` and are ignored everywhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state_machine::states::{QcOutcome, RepairStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairTicket {
    pub repair_id: Uuid,
    pub order_id: Uuid,
    pub cassette_id: Uuid,
    pub status: RepairStatus,
    pub qc_outcome: QcOutcome,
    pub engineer_id: Option<Uuid>,
    pub parts_replaced: Vec<String>,
    pub findings: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome reported by the engineer when closing a repair ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairCompletion {
    pub qc_passed: bool,
    #[serde(default)]
    pub parts_replaced: Vec<String>,
    pub notes: Option<String>,
}

impl RepairTicket {
    pub fn for_cassette(order_id: Uuid, cassette_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            repair_id: Uuid::new_v4(),
            order_id,
            cassette_id,
            status: RepairStatus::Received,
            qc_outcome: QcOutcome::Pending,
            engineer_id: None,
            parts_replaced: Vec::new(),
            findings: None,
            started_at: None,
            completed_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none() && !self.status.is_terminal()
    }
}

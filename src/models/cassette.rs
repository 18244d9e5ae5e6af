//! # Cassette Model
//!
//! A removable currency module tracked as a physical asset. Registration and
//! retirement of cassettes belong to the asset registry; this core only ever
//! changes `status`, and only through the cassette state tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state_machine::states::CassetteStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cassette {
    pub cassette_id: Uuid,
    /// Unique across all banks
    pub serial_number: String,
    pub type_code: String,
    pub status: CassetteStatus,
    pub machine_id: Option<Uuid>,
    pub bank_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration payload used by the asset registry and by test fixtures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCassette {
    pub serial_number: String,
    pub type_code: String,
    pub bank_id: Uuid,
    pub machine_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<CassetteStatus>,
}

impl Cassette {
    pub fn register(new: NewCassette) -> Self {
        let now = Utc::now();
        Self {
            cassette_id: Uuid::new_v4(),
            serial_number: new.serial_number,
            type_code: new.type_code,
            status: new.status.unwrap_or(CassetteStatus::Ok),
            machine_id: new.machine_id,
            bank_id: new.bank_id,
            created_at: now,
            updated_at: now,
        }
    }
}

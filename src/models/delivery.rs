//! # Delivery and Return Models
//!
//! Records of physical movement between the pengelola and the repair center.
//! An order has at most one of each. After confirmation both are immutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierInfo {
    pub courier_name: String,
    pub tracking_number: Option<String>,
    pub sender_name: Option<String>,
    pub notes: Option<String>,
}

/// Shipment towards the repair center
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub delivery_id: Uuid,
    pub order_id: Uuid,
    /// Cassette the courier manifest is keyed on; the whole order travels together
    pub cassette_id: Option<Uuid>,
    pub courier: Option<CourierInfo>,
    /// No courier leg: the pengelola brought the cassettes in person
    pub self_delivery: bool,
    pub shipped_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub received_by: Option<Uuid>,
    pub received_notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub order_id: Uuid,
    pub cassette_id: Uuid,
    pub courier: CourierInfo,
    pub shipped_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnKind {
    /// Repaired (or replacement) cassette collected by the pengelola
    Pickup,
    /// Scrapped cassette retained by the repair center for disposal
    Disposal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnItem {
    pub detail_id: Uuid,
    pub cassette_id: Uuid,
    pub kind: ReturnKind,
}

/// Pickup/disposal confirmation. Mixed orders produce one combined record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnRecord {
    pub return_id: Uuid,
    pub order_id: Uuid,
    pub items: Vec<ReturnItem>,
    pub recipient_name: Option<String>,
    pub recipient_signature: Option<String>,
    pub confirmed_by: Uuid,
    pub notes: Option<String>,
    pub confirmed_at: DateTime<Utc>,
}

/// Payload of `confirm_pickup`. Signature and recipient are only required
/// when at least one cassette is physically picked up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PickupConfirmation {
    pub recipient_name: Option<String>,
    pub recipient_signature: Option<String>,
    pub notes: Option<String>,
}

impl Delivery {
    /// Courier shipment registered by the pengelola
    pub fn by_courier(request: &DeliveryRequest, created_by: Uuid) -> Self {
        let now = Utc::now();
        Self {
            delivery_id: Uuid::new_v4(),
            order_id: request.order_id,
            cassette_id: Some(request.cassette_id),
            courier: Some(request.courier.clone()),
            self_delivery: false,
            shipped_at: request.shipped_at.unwrap_or(now),
            received_at: None,
            received_by: None,
            received_notes: None,
            created_by,
            created_at: now,
        }
    }

    /// Record for cassettes handed over at the repair center counter
    pub fn self_delivered(order_id: Uuid, created_by: Uuid) -> Self {
        let now = Utc::now();
        Self {
            delivery_id: Uuid::new_v4(),
            order_id,
            cassette_id: None,
            courier: None,
            self_delivery: true,
            shipped_at: now,
            received_at: None,
            received_by: None,
            received_notes: None,
            created_by,
            created_at: now,
        }
    }

    pub fn mark_received(&mut self, received_by: Uuid, notes: Option<String>) {
        self.received_at = Some(Utc::now());
        self.received_by = Some(received_by);
        self.received_notes = notes;
    }

    pub fn is_received(&self) -> bool {
        self.received_at.is_some()
    }
}

impl ReturnRecord {
    pub fn has_pickups(&self) -> bool {
        self.items.iter().any(|i| i.kind == ReturnKind::Pickup)
    }
}

//! # Data Models
//!
//! Plain records for every entity the lifecycle core reads or writes. They
//! carry no persistence logic; the `database` module maps them to rows.

pub mod cassette;
pub mod delivery;
pub mod preventive_maintenance;
pub mod repair_ticket;
pub mod service_order;

pub use cassette::{Cassette, NewCassette};
pub use delivery::{
    CourierInfo, Delivery, DeliveryRequest, PickupConfirmation, ReturnItem, ReturnKind,
    ReturnRecord,
};
pub use preventive_maintenance::{
    NewPreventiveMaintenance, PmDetail, PmDetailUpdate, PmUpdate, PreventiveMaintenance,
};
pub use repair_ticket::{RepairCompletion, RepairTicket};
pub use service_order::{NewOrderDetail, NewServiceOrder, OrderDetail, OrderTransition, ServiceOrder};

use chrono::NaiveDate;

/// Prefix of service order ticket numbers
pub const ORDER_NUMBER_PREFIX: &str = "SO";
/// Prefix of PM task numbers
pub const PM_NUMBER_PREFIX: &str = "PM";

/// Human-facing number such as `SO-20260301-000042`. `sequence` is the
/// per-prefix, per-day counter handed out by the store.
pub fn document_number(prefix: &str, day: NaiveDate, sequence: u32) -> String {
    format!("{prefix}-{}-{sequence:06}", day.format("%Y%m%d"))
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares a status enum persisted as an upper/lower-case string column.
///
/// Generates `as_str`, `ALL`, `Display` and `FromStr` so the database text,
/// the JSON form and the log form never drift apart.
macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {s}", $label)),
                }
            }
        }
    };
}

status_enum! {
    /// Physical/process status of a cassette. Exactly one location is implied
    /// by each value (`IN_REPAIR` means the unit is being worked on).
    CassetteStatus, "cassette status" {
        Ok => "OK",
        Bad => "BAD",
        InTransit => "IN_TRANSIT",
        InRepair => "IN_REPAIR",
        ReadyForPickup => "READY_FOR_PICKUP",
        Scrapped => "SCRAPPED",
    }
}

status_enum! {
    /// Service order (ticket) status
    OrderStatus, "service order status" {
        Open => "OPEN",
        PendingApproval => "PENDING_APPROVAL",
        ApprovedOnSite => "APPROVED_ON_SITE",
        InDelivery => "IN_DELIVERY",
        Received => "RECEIVED",
        InProgress => "IN_PROGRESS",
        Resolved => "RESOLVED",
        Closed => "CLOSED",
    }
}

status_enum! {
    /// Where the repair physically happens
    RepairLocation, "repair location" {
        Rc => "RC",
        OnSite => "ON_SITE",
    }
}

status_enum! {
    OrderPriority, "priority" {
        Low => "LOW",
        Medium => "MEDIUM",
        High => "HIGH",
        Critical => "CRITICAL",
    }
}

status_enum! {
    /// Repair ticket status; the walk is strictly linear
    RepairStatus, "repair status" {
        Received => "RECEIVED",
        Diagnosing => "DIAGNOSING",
        OnProgress => "ON_PROGRESS",
        Completed => "COMPLETED",
    }
}

status_enum! {
    QcOutcome, "QC outcome" {
        Pending => "pending",
        Pass => "pass",
        Fail => "fail",
    }
}

status_enum! {
    /// Preventive maintenance task status
    PmStatus, "PM status" {
        Scheduled => "SCHEDULED",
        InProgress => "IN_PROGRESS",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
        Rescheduled => "RESCHEDULED",
    }
}

status_enum! {
    /// Per-cassette sub-status inside a PM task
    PmDetailStatus, "PM detail status" {
        Pending => "PENDING",
        InProgress => "IN_PROGRESS",
        Completed => "COMPLETED",
    }
}

status_enum! {
    PmType, "PM type" {
        Routine => "ROUTINE",
        OnDemand => "ON_DEMAND",
        Emergency => "EMERGENCY",
    }
}

impl CassetteStatus {
    /// Cassette is back with (or available to) the pengelola
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl OrderStatus {
    /// `CLOSED` is the only terminal status; cancellation is a soft delete
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Statuses in which the cassettes are physically at the repair center
    /// (or being worked on site) and repair work may be planned
    pub fn accepts_repair_work(&self) -> bool {
        matches!(self, Self::Received | Self::ApprovedOnSite | Self::InProgress)
    }
}

impl RepairStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl PmStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        Self::Open
    }
}

impl Default for RepairStatus {
    fn default() -> Self {
        Self::Received
    }
}

impl Default for PmStatus {
    fn default() -> Self {
        Self::Scheduled
    }
}

impl Default for PmDetailStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl Default for QcOutcome {
    fn default() -> Self {
        Self::Pending
    }
}

impl Default for RepairLocation {
    fn default() -> Self {
        Self::Rc
    }
}

impl Default for OrderPriority {
    fn default() -> Self {
        Self::Medium
    }
}

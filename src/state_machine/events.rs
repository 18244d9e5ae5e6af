use serde::{Deserialize, Serialize};
use std::fmt;

/// Events that move a cassette between physical/process locations.
///
/// The cassette table is keyed by event rather than by target status: the
/// same `IN_REPAIR` status is reached from a courier receipt, an on-site
/// repair start or a PM start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CassetteEvent {
    /// A service order was opened referencing the cassette
    ReportFault,
    /// Handed to a courier for the repair center
    Ship,
    /// Arrived at the repair center (courier or self-delivery)
    ReceiveAtRc,
    /// Repair work started at the pengelola's premises
    StartOnSiteRepair,
    QcPassed,
    QcFailed,
    /// Original cassette withdrawn because a replacement was bound
    RetireForReplacement,
    /// Stock cassette staged as a replacement for pickup
    StageReplacement,
    /// Collected by the pengelola against a signed return
    PickedUp,
    /// Disposal confirmed for a scrapped cassette
    Disposed,
    /// The referencing service order was cancelled
    CancelOrder,
    SchedulePm,
    StartPm,
    FinishPm,
    CancelPm,
}

impl CassetteEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ReportFault => "report_fault",
            Self::Ship => "ship",
            Self::ReceiveAtRc => "receive_at_rc",
            Self::StartOnSiteRepair => "start_on_site_repair",
            Self::QcPassed => "qc_passed",
            Self::QcFailed => "qc_failed",
            Self::RetireForReplacement => "retire_for_replacement",
            Self::StageReplacement => "stage_replacement",
            Self::PickedUp => "picked_up",
            Self::Disposed => "disposed",
            Self::CancelOrder => "cancel_order",
            Self::SchedulePm => "schedule_pm",
            Self::StartPm => "start_pm",
            Self::FinishPm => "finish_pm",
            Self::CancelPm => "cancel_pm",
        }
    }
}

/// Events that advance a service order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
    Ship,
    ReceiveAtRc,
    RequestOnSite,
    ApproveOnSite,
    RejectOnSite,
    StartRepair,
    /// Every cassette detail has a completed repair or a bound replacement
    RepairsSettled,
    /// Return record (pickup and/or disposal) persisted
    ConfirmReturn,
}

impl OrderEvent {
    pub const ALL: &'static [OrderEvent] = &[
        Self::Ship,
        Self::ReceiveAtRc,
        Self::RequestOnSite,
        Self::ApproveOnSite,
        Self::RejectOnSite,
        Self::StartRepair,
        Self::RepairsSettled,
        Self::ConfirmReturn,
    ];

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Ship => "ship",
            Self::ReceiveAtRc => "receive_at_rc",
            Self::RequestOnSite => "request_on_site",
            Self::ApproveOnSite => "approve_on_site",
            Self::RejectOnSite => "reject_on_site",
            Self::StartRepair => "start_repair",
            Self::RepairsSettled => "repairs_settled",
            Self::ConfirmReturn => "confirm_return",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairEvent {
    /// Engineer takes the ticket and starts diagnosis
    Take,
    BeginRepair,
    Complete,
}

impl RepairEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Take => "take",
            Self::BeginRepair => "begin_repair",
            Self::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PmEvent {
    Take,
    Reschedule,
    Complete,
    Cancel,
}

impl PmEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Take => "take",
            Self::Reschedule => "reschedule",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
        }
    }
}

macro_rules! display_via_event_type {
    ($($name:ident),+) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.event_type())
                }
            }
        )+
    };
}

display_via_event_type!(CassetteEvent, OrderEvent, RepairEvent, PmEvent);

/// Parses the persisted `event` column of `service_order_transitions`
impl std::str::FromStr for OrderEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|event| event.event_type() == s)
            .ok_or_else(|| format!("Invalid order event: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_event_parses_its_own_event_type() {
        for event in OrderEvent::ALL {
            assert_eq!(event.event_type().parse::<OrderEvent>().unwrap(), *event);
        }
        assert!("teleport".parse::<OrderEvent>().is_err());
    }

    #[test]
    fn test_serde_matches_event_type() {
        let json = serde_json::to_value(CassetteEvent::StartOnSiteRepair).unwrap();
        assert_eq!(json, CassetteEvent::StartOnSiteRepair.event_type());
    }
}

//! # Cassette State Tracker
//!
//! Table-driven status transitions for cassettes, keyed by triggering event.
//! Every component that needs to move a cassette calls
//! [`CassetteStateTracker::apply`]; it is the only producer of
//! [`Effect::CassetteStatusChanged`], and `apply_effects` is the only writer
//! of the status column.

use crate::error::{CassetteError, Result};
use crate::models::Cassette;
use crate::state_machine::effects::{Effect, EffectPlan};
use crate::state_machine::events::CassetteEvent;
use crate::state_machine::states::CassetteStatus;

use crate::state_machine::states::CassetteStatus::{
    Bad, InRepair, InTransit, Ok as Available, ReadyForPickup, Scrapped,
};

/// `(event, legal source statuses, resulting status)`
pub const CASSETTE_TRANSITIONS: &[(CassetteEvent, &[CassetteStatus], CassetteStatus)] = &[
    (CassetteEvent::ReportFault, &[Available, Bad], Bad),
    (CassetteEvent::Ship, &[Bad], InTransit),
    (CassetteEvent::ReceiveAtRc, &[InTransit, Bad], InRepair),
    (CassetteEvent::StartOnSiteRepair, &[Bad], InRepair),
    (CassetteEvent::QcPassed, &[InRepair], ReadyForPickup),
    (CassetteEvent::QcFailed, &[InRepair], Scrapped),
    (CassetteEvent::RetireForReplacement, &[InRepair], Scrapped),
    (CassetteEvent::StageReplacement, &[Available], ReadyForPickup),
    (CassetteEvent::PickedUp, &[ReadyForPickup], Available),
    (CassetteEvent::Disposed, &[Scrapped], Scrapped),
    (
        CassetteEvent::CancelOrder,
        &[Bad, InTransit, InRepair, ReadyForPickup],
        Available,
    ),
    (CassetteEvent::SchedulePm, &[Available], Available),
    (CassetteEvent::StartPm, &[Available], InRepair),
    (CassetteEvent::FinishPm, &[InRepair], Available),
    (CassetteEvent::CancelPm, &[InRepair], Available),
];

pub struct CassetteStateTracker;

impl CassetteStateTracker {
    /// Resulting status for `event` from `current`, if the table allows it
    pub fn next_status(current: CassetteStatus, event: CassetteEvent) -> Option<CassetteStatus> {
        CASSETTE_TRANSITIONS
            .iter()
            .find(|(e, sources, _)| *e == event && sources.contains(&current))
            .map(|(_, _, target)| *target)
    }

    pub fn permits(current: CassetteStatus, event: CassetteEvent) -> bool {
        Self::next_status(current, event).is_some()
    }

    /// Check `event` against the cassette without recording anything
    pub fn check(cassette: &Cassette, event: CassetteEvent) -> Result<CassetteStatus> {
        Self::next_status(cassette.status, event).ok_or_else(|| {
            CassetteError::IllegalCassetteTransition {
                cassette_id: cassette.cassette_id,
                status: cassette.status.to_string(),
                event: event.to_string(),
            }
        })
    }

    /// Apply `event` to the (locked) cassette row.
    ///
    /// Updates the in-memory copy so later planning in the same operation
    /// sees the new status, and records the change in `plan`. Self-loops
    /// (`SchedulePm`, `Disposed`) are validated but produce no effect.
    pub fn apply(
        cassette: &mut Cassette,
        event: CassetteEvent,
        plan: &mut EffectPlan,
    ) -> Result<CassetteStatus> {
        let from = cassette.status;
        let to = Self::check(cassette, event)?;

        if from != to {
            cassette.status = to;
            plan.push(Effect::CassetteStatusChanged {
                cassette_id: cassette.cassette_id,
                from,
                to,
                event,
            });
        }

        Ok(to)
    }
}

//! # Repair Ticket State Machine
//!
//! `RECEIVED → DIAGNOSING → ON_PROGRESS → COMPLETED`, one step at a time.

use chrono::Utc;

use crate::error::{CassetteError, Result};
use crate::models::RepairTicket;
use crate::state_machine::effects::{Effect, EffectPlan};
use crate::state_machine::events::RepairEvent;
use crate::state_machine::states::RepairStatus;

pub const REPAIR_TRANSITIONS: &[(RepairStatus, RepairEvent, RepairStatus)] = &[
    (RepairStatus::Received, RepairEvent::Take, RepairStatus::Diagnosing),
    (RepairStatus::Diagnosing, RepairEvent::BeginRepair, RepairStatus::OnProgress),
    (RepairStatus::OnProgress, RepairEvent::Complete, RepairStatus::Completed),
];

pub struct RepairStateMachine;

impl RepairStateMachine {
    pub fn next(current: RepairStatus, event: RepairEvent) -> Option<RepairStatus> {
        REPAIR_TRANSITIONS
            .iter()
            .find(|(from, e, _)| *from == current && *e == event)
            .map(|(_, _, to)| *to)
    }

    /// Advance the ticket in place; `mutate` fills event-specific fields
    /// (engineer, QC outcome) before the effect is recorded.
    pub fn transition(
        ticket: &mut RepairTicket,
        event: RepairEvent,
        plan: &mut EffectPlan,
        mutate: impl FnOnce(&mut RepairTicket),
    ) -> Result<RepairStatus> {
        let from = ticket.status;
        let to = Self::next(from, event).ok_or_else(|| CassetteError::InvalidTransition {
            entity: "repair_ticket",
            from: from.to_string(),
            to: event.to_string(),
        })?;

        let now = Utc::now();
        ticket.status = to;
        ticket.updated_at = now;
        match to {
            RepairStatus::Diagnosing => ticket.started_at = Some(now),
            RepairStatus::Completed => ticket.completed_at = Some(now),
            _ => {}
        }
        mutate(ticket);

        plan.push(Effect::RepairTicketUpdated {
            ticket: ticket.clone(),
            from,
        });

        Ok(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_linear_walk() {
        let mut ticket = RepairTicket::for_cassette(Uuid::new_v4(), Uuid::new_v4());
        let mut plan = EffectPlan::new();
        let engineer = Uuid::new_v4();

        RepairStateMachine::transition(&mut ticket, RepairEvent::Take, &mut plan, |t| {
            t.engineer_id = Some(engineer)
        })
        .unwrap();
        assert!(ticket.started_at.is_some());
        RepairStateMachine::transition(&mut ticket, RepairEvent::BeginRepair, &mut plan, |_| {})
            .unwrap();
        RepairStateMachine::transition(&mut ticket, RepairEvent::Complete, &mut plan, |_| {})
            .unwrap();

        assert_eq!(ticket.status, RepairStatus::Completed);
        assert_eq!(ticket.engineer_id, Some(engineer));
        assert!(ticket.completed_at.is_some());
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn test_cannot_complete_from_received() {
        let mut ticket = RepairTicket::for_cassette(Uuid::new_v4(), Uuid::new_v4());
        let mut plan = EffectPlan::new();
        let err = RepairStateMachine::transition(&mut ticket, RepairEvent::Complete, &mut plan, |_| {})
            .unwrap_err();
        assert!(matches!(err, CassetteError::InvalidTransition { .. }));
        assert_eq!(ticket.status, RepairStatus::Received);
        assert!(plan.is_empty());
    }
}

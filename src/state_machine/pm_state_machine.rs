//! # Preventive Maintenance State Machine
//!
//! `SCHEDULED → IN_PROGRESS → COMPLETED`, with `RESCHEDULED` as a parking
//! state that can be rescheduled again or taken, and `CANCELLED` reachable
//! from every non-terminal state.

use chrono::Utc;

use crate::error::{CassetteError, Result};
use crate::models::PreventiveMaintenance;
use crate::state_machine::effects::{Effect, EffectPlan};
use crate::state_machine::events::PmEvent;
use crate::state_machine::states::{PmDetailStatus, PmStatus};

pub const PM_TRANSITIONS: &[(PmStatus, PmEvent, PmStatus)] = &[
    (PmStatus::Scheduled, PmEvent::Take, PmStatus::InProgress),
    (PmStatus::Rescheduled, PmEvent::Take, PmStatus::InProgress),
    (PmStatus::Scheduled, PmEvent::Reschedule, PmStatus::Rescheduled),
    (PmStatus::Rescheduled, PmEvent::Reschedule, PmStatus::Rescheduled),
    (PmStatus::InProgress, PmEvent::Complete, PmStatus::Completed),
    (PmStatus::Scheduled, PmEvent::Cancel, PmStatus::Cancelled),
    (PmStatus::Rescheduled, PmEvent::Cancel, PmStatus::Cancelled),
    (PmStatus::InProgress, PmEvent::Cancel, PmStatus::Cancelled),
];

pub struct PmStateMachine;

impl PmStateMachine {
    pub fn next(current: PmStatus, event: PmEvent) -> Option<PmStatus> {
        PM_TRANSITIONS
            .iter()
            .find(|(from, e, _)| *from == current && *e == event)
            .map(|(_, _, to)| *to)
    }

    /// Advance the PM in place. `complete` is guarded here: every detail row
    /// must report `COMPLETED` first.
    pub fn transition(
        pm: &mut PreventiveMaintenance,
        event: PmEvent,
        plan: &mut EffectPlan,
    ) -> Result<PmStatus> {
        let from = pm.status;
        let to = Self::next(from, event).ok_or_else(|| CassetteError::InvalidTransition {
            entity: "preventive_maintenance",
            from: from.to_string(),
            to: event.to_string(),
        })?;

        if event == PmEvent::Complete && !pm.all_details_completed() {
            let pending = pm
                .details
                .iter()
                .filter(|d| d.status != PmDetailStatus::Completed)
                .count();
            return Err(CassetteError::precondition(format!(
                "PM {} has {pending} cassette detail(s) not yet completed",
                pm.pm_number
            )));
        }

        let now = Utc::now();
        pm.status = to;
        pm.updated_at = now;
        match to {
            PmStatus::InProgress => pm.started_at = Some(now),
            PmStatus::Completed => pm.completed_at = Some(now),
            _ => {}
        }

        plan.push(Effect::PmUpdated {
            pm: pm.clone(),
            from,
        });

        Ok(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewPreventiveMaintenance;
    use crate::state_machine::states::PmType;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn pm() -> PreventiveMaintenance {
        PreventiveMaintenance::schedule(
            &NewPreventiveMaintenance {
                cassette_ids: vec![Uuid::new_v4()],
                scheduled_date: NaiveDate::from_ymd_opt(2026, 5, 4).unwrap(),
                pm_type: PmType::Routine,
                engineer_id: None,
                location: None,
                notes: None,
                interval_days: Some(30),
                auto_schedule: true,
            },
            "PM-20260504-000001".to_string(),
            Uuid::new_v4(),
            90,
        )
    }

    #[test]
    fn test_complete_requires_all_details() {
        let mut pm = pm();
        let mut plan = EffectPlan::new();
        PmStateMachine::transition(&mut pm, PmEvent::Take, &mut plan).unwrap();

        let err = PmStateMachine::transition(&mut pm, PmEvent::Complete, &mut plan).unwrap_err();
        assert!(matches!(err, CassetteError::PreconditionFailed(_)));
        assert_eq!(pm.status, PmStatus::InProgress);

        pm.details[0].status = PmDetailStatus::Completed;
        assert_eq!(
            PmStateMachine::transition(&mut pm, PmEvent::Complete, &mut plan).unwrap(),
            PmStatus::Completed
        );
        assert!(pm.completed_at.is_some());
    }

    #[test]
    fn test_reschedule_then_take() {
        let mut pm = pm();
        let mut plan = EffectPlan::new();
        PmStateMachine::transition(&mut pm, PmEvent::Reschedule, &mut plan).unwrap();
        PmStateMachine::transition(&mut pm, PmEvent::Reschedule, &mut plan).unwrap();
        assert_eq!(
            PmStateMachine::transition(&mut pm, PmEvent::Take, &mut plan).unwrap(),
            PmStatus::InProgress
        );
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        for event in [PmEvent::Take, PmEvent::Reschedule, PmEvent::Complete, PmEvent::Cancel] {
            assert_eq!(PmStateMachine::next(PmStatus::Completed, event), None);
            assert_eq!(PmStateMachine::next(PmStatus::Cancelled, event), None);
        }
    }
}

//! # PM Conflict Guard
//!
//! Owns the preventive maintenance lifecycle and the rule that a cassette
//! is attached to at most one non-terminal PM task at a time.
//!
//! [`PmConflictGuard::schedule`] is the only way a PM task is created. The
//! auto-scheduler goes through it too, so the conflict check cannot be
//! bypassed.

use chrono::{NaiveDate, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::database::UnitOfWork;
use crate::error::{CassetteError, Result};
use crate::logging::{log_error, log_pm_operation};
use crate::models::{
    document_number, NewPreventiveMaintenance, PmUpdate, PreventiveMaintenance, PM_NUMBER_PREFIX,
};
use crate::orchestration::core::{LockedCassettes, OrchestrationContext};
use crate::services::{Action, Actor, NextPmOccurrence};
use crate::state_machine::effects::{Effect, EffectPlan};
use crate::state_machine::events::{CassetteEvent, PmEvent};
use crate::state_machine::guards::{NoActivePmGuard, StateGuard};
use crate::state_machine::pm_state_machine::PmStateMachine;
use crate::state_machine::states::{CassetteStatus, PmDetailStatus, PmStatus};

#[derive(Debug, Clone)]
pub struct PmConflictGuard {
    context: OrchestrationContext,
}

impl PmConflictGuard {
    pub fn new(context: OrchestrationContext) -> Self {
        Self { context }
    }

    /// Schedule a PM task for one or more `OK` cassettes.
    ///
    /// Fails with `Conflict` ("cannot create simultaneous PM") if any
    /// cassette already has a non-terminal PM task.
    pub async fn schedule(
        &self,
        actor: &Actor,
        request: NewPreventiveMaintenance,
    ) -> Result<PreventiveMaintenance> {
        self.context.authorize(actor, Action::SchedulePm).await?;
        self.schedule_pm(actor, request)
            .await
            .inspect_err(|e| log_error("pm.schedule", e))
    }

    async fn schedule_pm(
        &self,
        actor: &Actor,
        request: NewPreventiveMaintenance,
    ) -> Result<PreventiveMaintenance> {
        validate_new_pm(&request)?;

        let mut uow = self.context.begin().await?;
        let mut cassettes = LockedCassettes::lock(uow.as_mut(), &request.cassette_ids).await?;

        // A taken PM leaves its cassettes IN_REPAIR; report the PM, not the status
        NoActivePmGuard
            .check(request.cassette_ids.as_slice(), uow.as_mut())
            .await?;

        let mut plan = EffectPlan::new();
        for id in &request.cassette_ids {
            cassettes.apply(*id, CassetteEvent::SchedulePm, &mut plan)?;
        }

        let sequence = uow
            .next_document_sequence(PM_NUMBER_PREFIX, request.scheduled_date)
            .await?;
        let pm = PreventiveMaintenance::schedule(
            &request,
            document_number(PM_NUMBER_PREFIX, request.scheduled_date, sequence),
            actor.actor_id,
            self.context.config.preventive_maintenance.default_interval_days,
        );
        plan.push(Effect::PmScheduled(pm.clone()));

        self.context.commit(uow, &plan, actor).await?;

        log_pm_operation(
            "schedule",
            Some(pm.pm_id),
            Some(&pm.pm_number),
            pm.status.as_str(),
            Some(&format!(
                "{} cassette(s) on {}",
                pm.details.len(),
                pm.scheduled_date
            )),
        );
        Ok(pm)
    }

    /// Edit engineer, location, notes and per-cassette checklist, findings
    /// and sub-status. Sub-status only moves while the PM is `IN_PROGRESS`.
    pub async fn update(
        &self,
        actor: &Actor,
        pm_id: Uuid,
        update: PmUpdate,
    ) -> Result<PreventiveMaintenance> {
        self.context.authorize(actor, Action::UpdatePm).await?;
        self.update_pm(actor, pm_id, update)
            .await
            .inspect_err(|e| log_error("pm.update", e))
    }

    async fn update_pm(
        &self,
        actor: &Actor,
        pm_id: Uuid,
        update: PmUpdate,
    ) -> Result<PreventiveMaintenance> {
        let mut uow = self.context.begin().await?;
        let mut pm = lock_pm(uow.as_mut(), pm_id).await?;

        if pm.status.is_terminal() {
            return Err(CassetteError::precondition(format!(
                "PM {} is {} and can no longer be edited",
                pm.pm_number, pm.status
            )));
        }

        if let Some(engineer_id) = update.engineer_id {
            pm.engineer_id = Some(engineer_id);
        }
        if update.location.is_some() {
            pm.location = update.location;
        }
        if update.notes.is_some() {
            pm.notes = update.notes;
        }

        for change in update.details {
            if change.status.is_some() && pm.status != PmStatus::InProgress {
                return Err(CassetteError::precondition(format!(
                    "Cassette progress can only be reported while PM {} is IN_PROGRESS",
                    pm.pm_number
                )));
            }
            let detail = pm
                .details
                .iter_mut()
                .find(|d| d.cassette_id == change.cassette_id)
                .ok_or_else(|| {
                    CassetteError::validation(format!(
                        "Cassette {} is not part of this PM",
                        change.cassette_id
                    ))
                })?;
            if let Some(status) = change.status {
                detail.status = status;
            }
            if let Some(checklist) = change.checklist {
                detail.checklist = checklist;
            }
            if change.findings.is_some() {
                detail.findings = change.findings;
            }
        }

        pm.updated_at = Utc::now();
        let mut plan = EffectPlan::new();
        plan.push(Effect::PmUpdated {
            pm: pm.clone(),
            from: pm.status,
        });
        self.context.commit(uow, &plan, actor).await?;

        log_pm_operation("update", Some(pm.pm_id), Some(&pm.pm_number), pm.status.as_str(), None);
        Ok(pm)
    }

    /// Engineer takes the PM: cassettes go `OK → IN_REPAIR`.
    /// The engineer defaults to the one already assigned, then the caller.
    pub async fn take(
        &self,
        actor: &Actor,
        pm_id: Uuid,
        engineer_id: Option<Uuid>,
    ) -> Result<PreventiveMaintenance> {
        self.context.authorize(actor, Action::TakePm).await?;
        self.take_pm(actor, pm_id, engineer_id)
            .await
            .inspect_err(|e| log_error("pm.take", e))
    }

    async fn take_pm(
        &self,
        actor: &Actor,
        pm_id: Uuid,
        engineer_id: Option<Uuid>,
    ) -> Result<PreventiveMaintenance> {
        let mut uow = self.context.begin().await?;
        let mut pm = lock_pm(uow.as_mut(), pm_id).await?;
        let mut cassettes = LockedCassettes::lock(uow.as_mut(), &pm.cassette_ids()).await?;

        pm.engineer_id = engineer_id.or(pm.engineer_id).or(Some(actor.actor_id));
        for detail in pm.details.iter_mut() {
            if detail.status == PmDetailStatus::Pending {
                detail.status = PmDetailStatus::InProgress;
            }
        }

        let mut plan = EffectPlan::new();
        PmStateMachine::transition(&mut pm, PmEvent::Take, &mut plan)?;
        for id in pm.cassette_ids() {
            cassettes.apply(id, CassetteEvent::StartPm, &mut plan)?;
        }

        self.context.commit(uow, &plan, actor).await?;

        log_pm_operation("take", Some(pm.pm_id), Some(&pm.pm_number), pm.status.as_str(), None);
        Ok(pm)
    }

    /// Move a PM that has not started to a new date
    pub async fn reschedule(
        &self,
        actor: &Actor,
        pm_id: Uuid,
        scheduled_date: NaiveDate,
    ) -> Result<PreventiveMaintenance> {
        self.context.authorize(actor, Action::ReschedulePm).await?;
        self.reschedule_pm(actor, pm_id, scheduled_date)
            .await
            .inspect_err(|e| log_error("pm.reschedule", e))
    }

    async fn reschedule_pm(
        &self,
        actor: &Actor,
        pm_id: Uuid,
        scheduled_date: NaiveDate,
    ) -> Result<PreventiveMaintenance> {
        let mut uow = self.context.begin().await?;
        let mut pm = lock_pm(uow.as_mut(), pm_id).await?;
        let previous = pm.scheduled_date;

        pm.scheduled_date = scheduled_date;
        let mut plan = EffectPlan::new();
        PmStateMachine::transition(&mut pm, PmEvent::Reschedule, &mut plan)?;
        self.context.commit(uow, &plan, actor).await?;

        log_pm_operation(
            "reschedule",
            Some(pm.pm_id),
            Some(&pm.pm_number),
            pm.status.as_str(),
            Some(&format!("{previous} -> {scheduled_date}")),
        );
        Ok(pm)
    }

    /// Complete an `IN_PROGRESS` PM whose every detail is `COMPLETED`.
    ///
    /// Cassettes return to `OK`. A routine PM with auto-scheduling on hands
    /// its next occurrence to the PM scheduler after commit.
    pub async fn complete(&self, actor: &Actor, pm_id: Uuid) -> Result<PreventiveMaintenance> {
        self.context.authorize(actor, Action::CompletePm).await?;
        self.complete_pm(actor, pm_id)
            .await
            .inspect_err(|e| log_error("pm.complete", e))
    }

    async fn complete_pm(&self, actor: &Actor, pm_id: Uuid) -> Result<PreventiveMaintenance> {
        let mut uow = self.context.begin().await?;
        let mut pm = lock_pm(uow.as_mut(), pm_id).await?;
        let mut cassettes = LockedCassettes::lock(uow.as_mut(), &pm.cassette_ids()).await?;

        let mut plan = EffectPlan::new();
        PmStateMachine::transition(&mut pm, PmEvent::Complete, &mut plan)?;
        for id in pm.cassette_ids() {
            cassettes.apply(id, CassetteEvent::FinishPm, &mut plan)?;
        }

        self.context.commit(uow, &plan, actor).await?;

        log_pm_operation("complete", Some(pm.pm_id), Some(&pm.pm_number), pm.status.as_str(), None);

        if self.context.config.preventive_maintenance.auto_schedule_enabled {
            if let Some(next) = NextPmOccurrence::following(&pm) {
                let scheduled_date = next.scheduled_date;
                match self.context.scheduler.enqueue(next).await {
                    Ok(()) => log_pm_operation(
                        "enqueue_next_occurrence",
                        Some(pm.pm_id),
                        Some(&pm.pm_number),
                        pm.status.as_str(),
                        Some(&scheduled_date.to_string()),
                    ),
                    Err(e) => log_error("pm.enqueue_next_occurrence", &e),
                }
            }
        }

        Ok(pm)
    }

    /// Cancel a non-terminal PM; cassettes already in maintenance go back to `OK`
    pub async fn cancel(
        &self,
        actor: &Actor,
        pm_id: Uuid,
        reason: Option<String>,
    ) -> Result<PreventiveMaintenance> {
        self.context.authorize(actor, Action::CancelPm).await?;
        self.cancel_pm(actor, pm_id, reason)
            .await
            .inspect_err(|e| log_error("pm.cancel", e))
    }

    async fn cancel_pm(
        &self,
        actor: &Actor,
        pm_id: Uuid,
        reason: Option<String>,
    ) -> Result<PreventiveMaintenance> {
        let mut uow = self.context.begin().await?;
        let mut pm = lock_pm(uow.as_mut(), pm_id).await?;
        let mut cassettes = LockedCassettes::lock(uow.as_mut(), &pm.cassette_ids()).await?;

        let mut plan = EffectPlan::new();
        plan_cancel(&mut pm, &mut cassettes, reason, &mut plan)?;
        self.context.commit(uow, &plan, actor).await?;

        log_pm_operation(
            "cancel",
            Some(pm.pm_id),
            Some(&pm.pm_number),
            pm.status.as_str(),
            pm.cancel_reason.as_deref(),
        );
        Ok(pm)
    }

    /// Stop a routine PM from enqueueing its next occurrence on completion
    pub async fn disable_auto_schedule(
        &self,
        actor: &Actor,
        pm_id: Uuid,
    ) -> Result<PreventiveMaintenance> {
        self.context
            .authorize(actor, Action::DisableAutoSchedule)
            .await?;
        self.disable_auto(actor, pm_id)
            .await
            .inspect_err(|e| log_error("pm.disable_auto_schedule", e))
    }

    async fn disable_auto(&self, actor: &Actor, pm_id: Uuid) -> Result<PreventiveMaintenance> {
        let mut uow = self.context.begin().await?;
        let mut pm = lock_pm(uow.as_mut(), pm_id).await?;
        if !pm.auto_schedule {
            return Ok(pm);
        }

        pm.auto_schedule = false;
        pm.updated_at = Utc::now();
        let mut plan = EffectPlan::new();
        plan.push(Effect::PmUpdated {
            pm: pm.clone(),
            from: pm.status,
        });
        self.context.commit(uow, &plan, actor).await?;

        log_pm_operation(
            "disable_auto_schedule",
            Some(pm.pm_id),
            Some(&pm.pm_number),
            pm.status.as_str(),
            None,
        );
        Ok(pm)
    }

    /// Soft-delete the PM, cancelling it first if it is still active
    pub async fn delete(
        &self,
        actor: &Actor,
        pm_id: Uuid,
        reason: Option<String>,
    ) -> Result<PreventiveMaintenance> {
        self.context.authorize(actor, Action::DeletePm).await?;
        self.delete_pm(actor, pm_id, reason)
            .await
            .inspect_err(|e| log_error("pm.delete", e))
    }

    async fn delete_pm(
        &self,
        actor: &Actor,
        pm_id: Uuid,
        reason: Option<String>,
    ) -> Result<PreventiveMaintenance> {
        let mut uow = self.context.begin().await?;
        let mut pm = lock_pm(uow.as_mut(), pm_id).await?;
        let mut cassettes = LockedCassettes::lock(uow.as_mut(), &pm.cassette_ids()).await?;

        let mut plan = EffectPlan::new();
        if !pm.status.is_terminal() {
            plan_cancel(&mut pm, &mut cassettes, reason, &mut plan)?;
        }
        pm.deleted_at = Some(Utc::now());
        plan.push(Effect::PmDeleted(pm.clone()));

        self.context.commit(uow, &plan, actor).await?;

        log_pm_operation("delete", Some(pm.pm_id), Some(&pm.pm_number), pm.status.as_str(), None);
        Ok(pm)
    }

    pub async fn get_pm(&self, actor: &Actor, pm_id: Uuid) -> Result<PreventiveMaintenance> {
        self.context.authorize(actor, Action::ReadPm).await?;
        let mut uow = self.context.begin().await?;
        uow.find_pm(pm_id)
            .await?
            .ok_or_else(|| CassetteError::not_found("preventive_maintenance", pm_id))
    }
}

async fn lock_pm(uow: &mut dyn UnitOfWork, pm_id: Uuid) -> Result<PreventiveMaintenance> {
    uow.lock_pm(pm_id)
        .await?
        .ok_or_else(|| CassetteError::not_found("preventive_maintenance", pm_id))
}

/// `→ CANCELLED`; cassettes of a PM that had started leave `IN_REPAIR`
fn plan_cancel(
    pm: &mut PreventiveMaintenance,
    cassettes: &mut LockedCassettes,
    reason: Option<String>,
    plan: &mut EffectPlan,
) -> Result<()> {
    let started = pm.status == PmStatus::InProgress;
    pm.cancel_reason = reason;
    PmStateMachine::transition(pm, PmEvent::Cancel, plan)?;

    if started {
        for id in pm.cassette_ids() {
            if cassettes.status(id)? == CassetteStatus::InRepair {
                cassettes.apply(id, CassetteEvent::CancelPm, plan)?;
            }
        }
    }
    Ok(())
}

fn validate_new_pm(request: &NewPreventiveMaintenance) -> Result<()> {
    if request.cassette_ids.is_empty() {
        return Err(CassetteError::validation(
            "A PM task needs at least one cassette",
        ));
    }

    let mut seen = HashSet::new();
    if let Some(duplicate) = request.cassette_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(CassetteError::validation(format!(
            "Cassette {duplicate} is listed more than once"
        )));
    }

    if request.interval_days == Some(0) {
        return Err(CassetteError::validation(
            "interval_days must be greater than 0",
        ));
    }

    Ok(())
}

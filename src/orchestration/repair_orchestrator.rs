//! # Repair Orchestrator
//!
//! Creates one repair ticket per cassette that needs repair when an order
//! enters `IN_PROGRESS`, walks tickets through diagnosis and repair, and
//! applies QC outcomes to the cassette and the owning order.
//!
//! Completing the last open ticket of an order resolves the order in the
//! same unit of work as the cassette change.

use uuid::Uuid;

use crate::database::UnitOfWork;
use crate::error::{CassetteError, Result};
use crate::logging::{log_error, log_order_operation};
use crate::models::{RepairCompletion, RepairTicket, ServiceOrder};
use crate::orchestration::core::{LockedCassettes, OrchestrationContext};
use crate::orchestration::service_order_manager::{
    lock_order, recompute_aggregate, start_repair_work,
};
use crate::services::{Action, Actor};
use crate::state_machine::effects::{Effect, EffectPlan};
use crate::state_machine::events::{CassetteEvent, RepairEvent};
use crate::state_machine::guards::{NoActiveRepairTicketGuard, StateGuard};
use crate::state_machine::repair_state_machine::RepairStateMachine;
use crate::state_machine::states::{OrderStatus, QcOutcome};

#[derive(Debug, Clone)]
pub struct RepairOrchestrator {
    context: OrchestrationContext,
}

impl RepairOrchestrator {
    pub fn new(context: OrchestrationContext) -> Self {
        Self { context }
    }

    /// Start repair on a `RECEIVED` or `APPROVED_ON_SITE` order and create
    /// its repair tickets in bulk.
    ///
    /// Details flagged for replacement are skipped. Fails with `Conflict` if
    /// the order already has tickets or a cassette has an active ticket
    /// elsewhere; nothing is created in that case.
    pub async fn create_bulk_from_order(
        &self,
        actor: &Actor,
        order_id: Uuid,
    ) -> Result<Vec<RepairTicket>> {
        self.context
            .authorize(actor, Action::CreateRepairTickets)
            .await?;
        self.create_bulk(actor, order_id)
            .await
            .inspect_err(|e| log_error("repair.create_bulk_from_order", e))
    }

    async fn create_bulk(&self, actor: &Actor, order_id: Uuid) -> Result<Vec<RepairTicket>> {
        let mut uow = self.context.begin().await?;
        let mut order = lock_order(uow.as_mut(), order_id).await?;

        if !uow.repair_tickets_for_order(order_id).await?.is_empty() {
            return Err(CassetteError::conflict(format!(
                "Order {} already has repair tickets",
                order.ticket_number
            )));
        }
        if !matches!(
            order.status,
            OrderStatus::Received | OrderStatus::ApprovedOnSite
        ) {
            return Err(CassetteError::InvalidTransition {
                entity: "service_order",
                from: order.status.to_string(),
                to: OrderStatus::InProgress.to_string(),
            });
        }

        let mut plan = EffectPlan::new();
        start_repair_work(uow.as_mut(), &mut order, &mut plan).await?;
        let tickets = plan.created_tickets();

        self.context.commit(uow, &plan, actor).await?;

        log_order_operation(
            "create_repair_tickets",
            Some(order.order_id),
            Some(&order.ticket_number),
            order.status.as_str(),
            Some(&format!("{} ticket(s)", tickets.len())),
        );
        Ok(tickets)
    }

    /// Engineer takes the ticket: `RECEIVED → DIAGNOSING`.
    /// Defaults the engineer to the calling actor.
    pub async fn take(
        &self,
        actor: &Actor,
        repair_id: Uuid,
        engineer_id: Option<Uuid>,
    ) -> Result<RepairTicket> {
        self.context.authorize(actor, Action::TakeRepair).await?;
        let engineer = engineer_id.unwrap_or(actor.actor_id);
        self.advance_ticket(actor, repair_id, RepairEvent::Take, move |t| {
            t.engineer_id = Some(engineer)
        })
        .await
        .inspect_err(|e| log_error("repair.take", e))
    }

    /// `DIAGNOSING → ON_PROGRESS`
    pub async fn start(&self, actor: &Actor, repair_id: Uuid) -> Result<RepairTicket> {
        self.context.authorize(actor, Action::StartRepair).await?;
        self.advance_ticket(actor, repair_id, RepairEvent::BeginRepair, |_| {})
            .await
            .inspect_err(|e| log_error("repair.start", e))
    }

    async fn advance_ticket(
        &self,
        actor: &Actor,
        repair_id: Uuid,
        event: RepairEvent,
        mutate: impl FnOnce(&mut RepairTicket) + Send,
    ) -> Result<RepairTicket> {
        let mut uow = self.context.begin().await?;
        let mut ticket = lock_ticket(uow.as_mut(), repair_id).await?;

        let mut plan = EffectPlan::new();
        RepairStateMachine::transition(&mut ticket, event, &mut plan, mutate)?;
        self.context.commit(uow, &plan, actor).await?;

        tracing::info!(
            repair_id = %ticket.repair_id,
            order_id = %ticket.order_id,
            status = %ticket.status,
            event = %event,
            "REPAIR_OPERATION"
        );
        Ok(ticket)
    }

    /// Complete the ticket with a QC outcome.
    ///
    /// QC pass moves the cassette to `READY_FOR_PICKUP`, QC fail to
    /// `SCRAPPED`. If this settles the last detail the order resolves.
    pub async fn complete(
        &self,
        actor: &Actor,
        repair_id: Uuid,
        completion: RepairCompletion,
    ) -> Result<RepairTicket> {
        self.context.authorize(actor, Action::CompleteRepair).await?;
        self.complete_ticket(actor, repair_id, completion)
            .await
            .inspect_err(|e| log_error("repair.complete", e))
    }

    async fn complete_ticket(
        &self,
        actor: &Actor,
        repair_id: Uuid,
        completion: RepairCompletion,
    ) -> Result<RepairTicket> {
        let mut uow = self.context.begin().await?;

        // Order before ticket: look the ticket up unlocked to find its order
        let order_id = uow
            .find_repair_ticket(repair_id)
            .await?
            .ok_or_else(|| CassetteError::not_found("repair_ticket", repair_id))?
            .order_id;
        let mut order = lock_order(uow.as_mut(), order_id).await?;
        let mut cassettes =
            LockedCassettes::lock(uow.as_mut(), &order.referenced_cassette_ids()).await?;
        let mut ticket = lock_ticket(uow.as_mut(), repair_id).await?;

        let outcome = if completion.qc_passed {
            QcOutcome::Pass
        } else {
            QcOutcome::Fail
        };

        let mut plan = EffectPlan::new();
        RepairStateMachine::transition(&mut ticket, RepairEvent::Complete, &mut plan, |t| {
            t.qc_outcome = outcome;
            t.parts_replaced = completion.parts_replaced;
            t.findings = completion.notes;
        })?;

        let cassette_event = match outcome {
            QcOutcome::Fail => CassetteEvent::QcFailed,
            _ => CassetteEvent::QcPassed,
        };
        cassettes.apply(ticket.cassette_id, cassette_event, &mut plan)?;
        let resolved = recompute_aggregate(uow.as_mut(), &mut order, &mut plan).await?;

        self.context.commit(uow, &plan, actor).await?;

        tracing::info!(
            repair_id = %ticket.repair_id,
            order_id = %order.order_id,
            cassette_id = %ticket.cassette_id,
            qc_outcome = %outcome,
            order_resolved = resolved,
            "REPAIR_OPERATION"
        );
        Ok(ticket)
    }

    pub async fn get_repair_ticket(&self, actor: &Actor, repair_id: Uuid) -> Result<RepairTicket> {
        self.context.authorize(actor, Action::ReadRepair).await?;
        let mut uow = self.context.begin().await?;
        uow.find_repair_ticket(repair_id)
            .await?
            .ok_or_else(|| CassetteError::not_found("repair_ticket", repair_id))
    }

    pub async fn repair_tickets_for_order(
        &self,
        actor: &Actor,
        order_id: Uuid,
    ) -> Result<Vec<RepairTicket>> {
        self.context.authorize(actor, Action::ReadRepair).await?;
        let mut uow = self.context.begin().await?;
        if uow.find_order(order_id).await?.is_none() {
            return Err(CassetteError::not_found("service_order", order_id));
        }
        uow.repair_tickets_for_order(order_id).await
    }
}

/// Lock a live (non-voided) repair ticket or fail with `NotFound`
async fn lock_ticket(uow: &mut dyn UnitOfWork, repair_id: Uuid) -> Result<RepairTicket> {
    uow.lock_repair_ticket(repair_id)
        .await?
        .ok_or_else(|| CassetteError::not_found("repair_ticket", repair_id))
}

/// Plan a ticket for every detail that needs one and does not have one yet
pub(crate) async fn plan_tickets(
    uow: &mut dyn UnitOfWork,
    order: &ServiceOrder,
    plan: &mut EffectPlan,
) -> Result<Vec<RepairTicket>> {
    let existing = uow.repair_tickets_for_order(order.order_id).await?;
    let cassette_ids: Vec<Uuid> = order
        .details
        .iter()
        .filter(|d| d.needs_repair_ticket())
        .filter(|d| !existing.iter().any(|t| t.cassette_id == d.cassette_id))
        .map(|d| d.cassette_id)
        .collect();

    if cassette_ids.is_empty() {
        return Ok(Vec::new());
    }

    NoActiveRepairTicketGuard
        .check(cassette_ids.as_slice(), uow)
        .await?;

    let tickets: Vec<RepairTicket> = cassette_ids
        .into_iter()
        .map(|cassette_id| RepairTicket::for_cassette(order.order_id, cassette_id))
        .collect();
    for ticket in &tickets {
        plan.push(Effect::RepairTicketCreated(ticket.clone()));
    }
    Ok(tickets)
}

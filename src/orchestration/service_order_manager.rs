//! # Service Order Lifecycle Manager
//!
//! Owns the service order aggregate: opening, generic status advancement,
//! replacement binding, cancellation and the derived `IN_PROGRESS → RESOLVED`
//! step.
//!
//! ## Aggregate recomputation
//!
//! An order in `IN_PROGRESS` resolves as soon as every detail is settled,
//! either by a completed repair ticket or by a bound replacement. Every
//! operation that can settle a detail calls [`recompute_aggregate`] inside
//! its own unit of work, so the persisted status is always the effective one.

use chrono::Utc;
use std::collections::HashSet;
use uuid::Uuid;

use crate::database::UnitOfWork;
use crate::error::{CassetteError, Result};
use crate::logging::{log_error, log_order_operation};
use crate::models::{
    document_number, Cassette, NewServiceOrder, OrderTransition, PickupConfirmation, ReturnRecord,
    ServiceOrder, ORDER_NUMBER_PREFIX,
};
use crate::orchestration::core::{LockedCassettes, OrchestrationContext};
use crate::orchestration::delivery_coordinator::{self, DeliveryReturnCoordinator};
use crate::orchestration::{on_site_gate, repair_orchestrator};
use crate::services::{Action, Actor};
use crate::state_machine::effects::{Effect, EffectPlan};
use crate::state_machine::events::{CassetteEvent, OrderEvent};
use crate::state_machine::guards::{
    unsettled_details, AllDetailsSettledGuard, NoOpenOrderGuard, StateGuard,
};
use crate::state_machine::order_state_machine::OrderStateMachine;
use crate::state_machine::states::{CassetteStatus, OrderStatus, RepairLocation};

#[derive(Debug, Clone)]
pub struct ServiceOrderManager {
    context: OrchestrationContext,
}

impl ServiceOrderManager {
    pub fn new(context: OrchestrationContext) -> Self {
        Self { context }
    }

    /// Open a service order for one or more faulty cassettes.
    ///
    /// Every referenced cassette moves to `BAD`. On-site orders go straight
    /// on to `PENDING_APPROVAL` in the same transaction.
    pub async fn open(&self, actor: &Actor, request: NewServiceOrder) -> Result<ServiceOrder> {
        self.context.authorize(actor, Action::OpenOrder).await?;
        self.open_order(actor, request)
            .await
            .inspect_err(|e| log_error("service_order.open", e))
    }

    async fn open_order(&self, actor: &Actor, request: NewServiceOrder) -> Result<ServiceOrder> {
        validate_new_order(&request)?;
        let cassette_ids: Vec<Uuid> = request.cassettes.iter().map(|d| d.cassette_id).collect();

        let mut uow = self.context.begin().await?;
        let mut cassettes = LockedCassettes::lock(uow.as_mut(), &cassette_ids).await?;
        NoOpenOrderGuard { except_order: None }
            .check(cassette_ids.as_slice(), uow.as_mut())
            .await?;

        let today = Utc::now().date_naive();
        let sequence = uow
            .next_document_sequence(ORDER_NUMBER_PREFIX, today)
            .await?;
        let mut order = ServiceOrder::open(
            &request,
            document_number(ORDER_NUMBER_PREFIX, today, sequence),
        );
        let mut plan = EffectPlan::new();
        plan.push(Effect::OrderOpened(order.clone()));
        for id in &cassette_ids {
            cassettes.apply(*id, CassetteEvent::ReportFault, &mut plan)?;
        }
        if order.repair_location == RepairLocation::OnSite {
            OrderStateMachine::transition(&mut order, OrderEvent::RequestOnSite, &mut plan)?;
        }

        self.context.commit(uow, &plan, actor).await?;

        log_order_operation(
            "open",
            Some(order.order_id),
            Some(&order.ticket_number),
            order.status.as_str(),
            Some(&format!("{} cassette(s)", cassette_ids.len())),
        );
        Ok(order)
    }

    /// Move the order one edge along its state machine.
    ///
    /// Edges with side effects are routed to the component that owns them:
    /// receipt records the delivery, starting repair creates tickets, and
    /// `RESOLVED` requires every detail settled. `IN_DELIVERY` and `CLOSED`
    /// need data only `create_delivery` and `confirm_pickup` carry.
    pub async fn advance(
        &self,
        actor: &Actor,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<ServiceOrder> {
        self.context.authorize(actor, Action::AdvanceOrder).await?;
        self.advance_order(actor, order_id, target)
            .await
            .inspect_err(|e| log_error("service_order.advance", e))
    }

    async fn advance_order(
        &self,
        actor: &Actor,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<ServiceOrder> {
        let mut uow = self.context.begin().await?;
        let mut order = lock_order(uow.as_mut(), order_id).await?;
        let from = order.status;

        let event = OrderStateMachine::event_for(from, target).ok_or_else(|| {
            CassetteError::InvalidTransition {
                entity: "service_order",
                from: from.to_string(),
                to: target.to_string(),
            }
        })?;

        let mut plan = EffectPlan::new();
        match event {
            OrderEvent::Ship => {
                return Err(CassetteError::precondition(
                    "IN_DELIVERY requires courier details; record a delivery instead",
                ))
            }
            OrderEvent::ConfirmReturn => {
                return Err(CassetteError::precondition(
                    "CLOSED requires a confirmed pickup",
                ))
            }
            OrderEvent::ReceiveAtRc => {
                delivery_coordinator::plan_receive(uow.as_mut(), &mut order, actor, None, &mut plan)
                    .await?;
            }
            OrderEvent::RequestOnSite => on_site_gate::plan_request(&mut order, &mut plan)?,
            OrderEvent::ApproveOnSite => on_site_gate::plan_approve(&mut order, &mut plan)?,
            OrderEvent::RejectOnSite => {
                on_site_gate::plan_reject(&mut order, actor.actor_id, None, &mut plan)?
            }
            OrderEvent::StartRepair => {
                start_repair_work(uow.as_mut(), &mut order, &mut plan).await?;
            }
            OrderEvent::RepairsSettled => {
                AllDetailsSettledGuard.check(&order, uow.as_mut()).await?;
                OrderStateMachine::transition(&mut order, event, &mut plan)?;
            }
        }

        self.context.commit(uow, &plan, actor).await?;

        log_order_operation(
            "advance",
            Some(order.order_id),
            Some(&order.ticket_number),
            order.status.as_str(),
            Some(&format!("from {from} via {event}")),
        );
        Ok(order)
    }

    /// Pickup confirmation, recorded by the delivery/return coordinator
    pub async fn confirm_pickup(
        &self,
        actor: &Actor,
        order_id: Uuid,
        confirmation: PickupConfirmation,
    ) -> Result<ReturnRecord> {
        DeliveryReturnCoordinator::new(self.context.clone())
            .create_return(actor, order_id, confirmation)
            .await
    }

    /// Bind a stock cassette as the replacement for a detail flagged
    /// `request_replacement`.
    ///
    /// The original cassette is retired (`SCRAPPED`), the replacement is
    /// staged (`READY_FOR_PICKUP`) and the order resolves if this settles
    /// the last detail.
    pub async fn create_replacement(
        &self,
        actor: &Actor,
        order_id: Uuid,
        detail_id: Uuid,
        replacement_cassette_id: Uuid,
    ) -> Result<ServiceOrder> {
        self.context
            .authorize(actor, Action::CreateReplacement)
            .await?;
        self.bind_replacement(actor, order_id, detail_id, replacement_cassette_id)
            .await
            .inspect_err(|e| log_error("service_order.create_replacement", e))
    }

    async fn bind_replacement(
        &self,
        actor: &Actor,
        order_id: Uuid,
        detail_id: Uuid,
        replacement_cassette_id: Uuid,
    ) -> Result<ServiceOrder> {
        let mut uow = self.context.begin().await?;
        let mut order = lock_order(uow.as_mut(), order_id).await?;

        if !matches!(order.status, OrderStatus::Received | OrderStatus::InProgress) {
            return Err(CassetteError::precondition(format!(
                "Replacements can only be bound while order {} is RECEIVED or IN_PROGRESS (currently {})",
                order.ticket_number, order.status
            )));
        }

        let detail = order
            .detail(detail_id)
            .ok_or_else(|| CassetteError::not_found("service_order_detail", detail_id))?;
        if !detail.request_replacement {
            return Err(CassetteError::precondition(format!(
                "Detail {detail_id} was not flagged for replacement"
            )));
        }
        if let Some(existing) = detail.replacement_cassette_id {
            return Err(CassetteError::conflict(format!(
                "Detail {detail_id} already has replacement cassette {existing}"
            )));
        }
        let original_id = detail.cassette_id;

        if order.referenced_cassette_ids().contains(&replacement_cassette_id) {
            return Err(CassetteError::validation(format!(
                "Cassette {replacement_cassette_id} is already part of order {}",
                order.ticket_number
            )));
        }

        let mut lock_ids = order.referenced_cassette_ids();
        lock_ids.push(replacement_cassette_id);
        let mut cassettes = LockedCassettes::lock(uow.as_mut(), &lock_ids).await?;
        NoOpenOrderGuard { except_order: None }
            .check(std::slice::from_ref(&replacement_cassette_id), uow.as_mut())
            .await?;

        let mut plan = EffectPlan::new();
        cassettes.apply(original_id, CassetteEvent::RetireForReplacement, &mut plan)?;
        cassettes.apply(
            replacement_cassette_id,
            CassetteEvent::StageReplacement,
            &mut plan,
        )?;

        if let Some(detail) = order.detail_mut(detail_id) {
            detail.replacement_cassette_id = Some(replacement_cassette_id);
        }
        plan.push(Effect::ReplacementBound {
            order_id,
            detail_id,
            replacement_cassette_id,
        });
        recompute_aggregate(uow.as_mut(), &mut order, &mut plan).await?;

        self.context.commit(uow, &plan, actor).await?;

        log_order_operation(
            "create_replacement",
            Some(order.order_id),
            Some(&order.ticket_number),
            order.status.as_str(),
            Some(&format!("{original_id} replaced by {replacement_cassette_id}")),
        );
        Ok(order)
    }

    /// Soft-delete the order.
    ///
    /// Active repair tickets are voided and every referenced cassette that
    /// is not `SCRAPPED` returns to `OK`.
    pub async fn cancel(&self, actor: &Actor, order_id: Uuid, reason: &str) -> Result<ServiceOrder> {
        self.context.authorize(actor, Action::CancelOrder).await?;
        self.cancel_order(actor, order_id, reason)
            .await
            .inspect_err(|e| log_error("service_order.cancel", e))
    }

    async fn cancel_order(
        &self,
        actor: &Actor,
        order_id: Uuid,
        reason: &str,
    ) -> Result<ServiceOrder> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CassetteError::validation("A cancellation reason is required"));
        }

        let mut uow = self.context.begin().await?;
        let mut order = lock_order(uow.as_mut(), order_id).await?;
        if order.status == OrderStatus::Closed {
            return Err(CassetteError::precondition(format!(
                "Order {} is already CLOSED",
                order.ticket_number
            )));
        }

        let referenced = order.referenced_cassette_ids();
        let mut cassettes = LockedCassettes::lock(uow.as_mut(), &referenced).await?;

        let mut plan = EffectPlan::new();
        for id in referenced {
            if !matches!(cassettes.status(id)?, CassetteStatus::Scrapped | CassetteStatus::Ok) {
                cassettes.apply(id, CassetteEvent::CancelOrder, &mut plan)?;
            }
        }

        if !uow.repair_tickets_for_order(order_id).await?.is_empty() {
            plan.push(Effect::RepairTicketsVoided { order_id });
        }

        order.deleted_at = Some(Utc::now());
        order.cancel_reason = Some(reason.to_string());
        order.cancelled_by = Some(actor.actor_id);
        plan.push(Effect::OrderCancelled {
            order_id,
            reason: reason.to_string(),
        });

        self.context.commit(uow, &plan, actor).await?;

        log_order_operation(
            "cancel",
            Some(order.order_id),
            Some(&order.ticket_number),
            order.status.as_str(),
            Some(reason),
        );
        Ok(order)
    }

    /// Re-derive the aggregate status and persist it if it changed
    pub async fn reconcile(&self, actor: &Actor, order_id: Uuid) -> Result<ServiceOrder> {
        self.context.authorize(actor, Action::AdvanceOrder).await?;
        self.reconcile_order(actor, order_id)
            .await
            .inspect_err(|e| log_error("service_order.reconcile", e))
    }

    async fn reconcile_order(&self, actor: &Actor, order_id: Uuid) -> Result<ServiceOrder> {
        let mut uow = self.context.begin().await?;
        let mut order = lock_order(uow.as_mut(), order_id).await?;
        let mut plan = EffectPlan::new();

        if recompute_aggregate(uow.as_mut(), &mut order, &mut plan).await? {
            self.context.commit(uow, &plan, actor).await?;
            log_order_operation(
                "reconcile",
                Some(order.order_id),
                Some(&order.ticket_number),
                order.status.as_str(),
                None,
            );
        }
        Ok(order)
    }

    pub async fn get_order(&self, actor: &Actor, order_id: Uuid) -> Result<ServiceOrder> {
        self.context.authorize(actor, Action::ReadOrder).await?;
        let mut uow = self.context.begin().await?;
        uow.find_order(order_id)
            .await?
            .ok_or_else(|| CassetteError::not_found("service_order", order_id))
    }

    /// Status transitions of the order, oldest first
    pub async fn order_history(
        &self,
        actor: &Actor,
        order_id: Uuid,
    ) -> Result<Vec<OrderTransition>> {
        self.context.authorize(actor, Action::ReadOrder).await?;
        let mut uow = self.context.begin().await?;
        if uow.find_order(order_id).await?.is_none() {
            return Err(CassetteError::not_found("service_order", order_id));
        }
        uow.order_transitions(order_id).await
    }

    pub async fn get_cassette(&self, actor: &Actor, cassette_id: Uuid) -> Result<Cassette> {
        self.context.authorize(actor, Action::ReadCassette).await?;
        let mut uow = self.context.begin().await?;
        uow.find_cassette(cassette_id)
            .await?
            .ok_or_else(|| CassetteError::not_found("cassette", cassette_id))
    }
}

/// Lock a live (non-cancelled) order or fail with `NotFound`
pub(crate) async fn lock_order(uow: &mut dyn UnitOfWork, order_id: Uuid) -> Result<ServiceOrder> {
    uow.lock_order(order_id)
        .await?
        .ok_or_else(|| CassetteError::not_found("service_order", order_id))
}

/// Enter `IN_PROGRESS`: on-site cassettes move to `IN_REPAIR`, a repair
/// ticket is created per detail that needs one, and the aggregate is
/// recomputed for orders whose details are all replacements.
pub(crate) async fn start_repair_work(
    uow: &mut dyn UnitOfWork,
    order: &mut ServiceOrder,
    plan: &mut EffectPlan,
) -> Result<()> {
    OrderStateMachine::transition(order, OrderEvent::StartRepair, plan)?;

    if order.repair_location == RepairLocation::OnSite {
        let cassette_ids = order.cassette_ids();
        let mut cassettes = LockedCassettes::lock(uow, &cassette_ids).await?;
        for id in cassette_ids {
            cassettes.apply(id, CassetteEvent::StartOnSiteRepair, plan)?;
        }
    }

    repair_orchestrator::plan_tickets(uow, order, plan).await?;
    recompute_aggregate(uow, order, plan).await?;
    Ok(())
}

/// Resolve an `IN_PROGRESS` order whose details are all settled, counting
/// ticket changes already in `plan`. Returns whether the order moved.
pub(crate) async fn recompute_aggregate(
    uow: &mut dyn UnitOfWork,
    order: &mut ServiceOrder,
    plan: &mut EffectPlan,
) -> Result<bool> {
    if order.status != OrderStatus::InProgress {
        return Ok(false);
    }
    if unsettled_details(order, uow, plan).await? > 0 {
        return Ok(false);
    }
    OrderStateMachine::transition(order, OrderEvent::RepairsSettled, plan)?;
    Ok(true)
}

fn validate_new_order(request: &NewServiceOrder) -> Result<()> {
    if request.cassettes.is_empty() {
        return Err(CassetteError::validation(
            "A service order needs at least one cassette",
        ));
    }

    let mut seen = HashSet::new();
    for detail in &request.cassettes {
        if !seen.insert(detail.cassette_id) {
            return Err(CassetteError::validation(format!(
                "Cassette {} is listed more than once",
                detail.cassette_id
            )));
        }
    }

    Ok(())
}

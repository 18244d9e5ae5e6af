//! # On-Site Approval Gate
//!
//! On-site repair needs an explicit decision by repair-center staff. An
//! order waits in `PENDING_APPROVAL` until it is approved
//! (`APPROVED_ON_SITE`, repair may start at the pengelola's premises) or
//! rejected (back to `OPEN` with the repair location switched to RC).
//!
//! No repair ticket can exist for an order in `PENDING_APPROVAL`: tickets
//! are only created on entering `IN_PROGRESS`.

use uuid::Uuid;

use crate::error::{CassetteError, Result};
use crate::logging::{log_error, log_order_operation};
use crate::models::ServiceOrder;
use crate::orchestration::core::OrchestrationContext;
use crate::orchestration::service_order_manager::lock_order;
use crate::services::{Action, Actor};
use crate::state_machine::effects::{Effect, EffectPlan};
use crate::state_machine::events::OrderEvent;
use crate::state_machine::order_state_machine::OrderStateMachine;
use crate::state_machine::states::RepairLocation;

#[derive(Debug, Clone)]
pub struct OnSiteApprovalGate {
    context: OrchestrationContext,
}

impl OnSiteApprovalGate {
    pub fn new(context: OrchestrationContext) -> Self {
        Self { context }
    }

    /// Ask for on-site repair of an `OPEN` order
    pub async fn request_on_site(&self, actor: &Actor, order_id: Uuid) -> Result<ServiceOrder> {
        self.context.authorize(actor, Action::RequestOnSite).await?;
        self.decide(actor, order_id, OrderEvent::RequestOnSite, plan_request)
            .await
            .inspect_err(|e| log_error("on_site.request", e))
    }

    pub async fn approve(&self, actor: &Actor, order_id: Uuid) -> Result<ServiceOrder> {
        self.context.authorize(actor, Action::ApproveOnSite).await?;
        self.decide(actor, order_id, OrderEvent::ApproveOnSite, plan_approve)
            .await
            .inspect_err(|e| log_error("on_site.approve", e))
    }

    /// Reject the request; the order falls back to the RC flow and keeps
    /// the reason and the deciding actor
    pub async fn reject(
        &self,
        actor: &Actor,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<ServiceOrder> {
        self.context.authorize(actor, Action::RejectOnSite).await?;
        let rejected_by = actor.actor_id;
        self.decide(actor, order_id, OrderEvent::RejectOnSite, move |order, plan| {
            plan_reject(order, rejected_by, reason, plan)
        })
        .await
        .inspect_err(|e| log_error("on_site.reject", e))
    }

    async fn decide(
        &self,
        actor: &Actor,
        order_id: Uuid,
        event: OrderEvent,
        planner: impl FnOnce(&mut ServiceOrder, &mut EffectPlan) -> Result<()>,
    ) -> Result<ServiceOrder> {
        let mut uow = self.context.begin().await?;
        let mut order = lock_order(uow.as_mut(), order_id).await?;

        let mut plan = EffectPlan::new();
        planner(&mut order, &mut plan)?;

        self.context.commit(uow, &plan, actor).await?;

        log_order_operation(
            event.event_type(),
            Some(order.order_id),
            Some(&order.ticket_number),
            order.status.as_str(),
            order.rejection_reason.as_deref().filter(|_| event == OrderEvent::RejectOnSite),
        );
        Ok(order)
    }
}

/// `OPEN → PENDING_APPROVAL`, switching the order to on-site repair
pub(crate) fn plan_request(order: &mut ServiceOrder, plan: &mut EffectPlan) -> Result<()> {
    OrderStateMachine::transition(order, OrderEvent::RequestOnSite, plan)?;
    set_location(order, RepairLocation::OnSite, plan);
    Ok(())
}

/// `PENDING_APPROVAL → APPROVED_ON_SITE`
pub(crate) fn plan_approve(order: &mut ServiceOrder, plan: &mut EffectPlan) -> Result<()> {
    if order.repair_location != RepairLocation::OnSite {
        return Err(CassetteError::precondition(format!(
            "Order {} is not an on-site order",
            order.ticket_number
        )));
    }
    OrderStateMachine::transition(order, OrderEvent::ApproveOnSite, plan)?;
    Ok(())
}

/// `PENDING_APPROVAL → OPEN`, switching the order back to RC repair
pub(crate) fn plan_reject(
    order: &mut ServiceOrder,
    rejected_by: Uuid,
    reason: Option<String>,
    plan: &mut EffectPlan,
) -> Result<()> {
    OrderStateMachine::transition(order, OrderEvent::RejectOnSite, plan)?;
    set_location(order, RepairLocation::Rc, plan);

    let reason = reason.filter(|r| !r.trim().is_empty());
    order.rejection_reason = reason.clone();
    order.rejected_by = Some(rejected_by);
    plan.push(Effect::OnSiteRejected {
        order_id: order.order_id,
        rejected_by,
        reason,
    });
    Ok(())
}

fn set_location(order: &mut ServiceOrder, location: RepairLocation, plan: &mut EffectPlan) {
    if order.repair_location != location {
        order.repair_location = location;
        plan.push(Effect::RepairLocationChanged {
            order_id: order.order_id,
            location,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewOrderDetail, NewServiceOrder};
    use crate::state_machine::states::{OrderPriority, OrderStatus};

    fn order(location: RepairLocation) -> ServiceOrder {
        ServiceOrder::open(
            &NewServiceOrder {
                reporter_id: Uuid::new_v4(),
                repair_location: location,
                priority: OrderPriority::Low,
                description: None,
                cassettes: vec![NewOrderDetail {
                    cassette_id: Uuid::new_v4(),
                    request_replacement: false,
                    problem_notes: None,
                }],
            },
            "SO-20260301-000001".to_string(),
        )
    }

    #[test]
    fn test_rejection_returns_order_to_rc_flow() {
        let mut o = order(RepairLocation::OnSite);
        let mut plan = EffectPlan::new();
        let staff = Uuid::new_v4();
        plan_request(&mut o, &mut plan).unwrap();
        plan_reject(&mut o, staff, Some("No engineer on site".to_string()), &mut plan).unwrap();

        assert_eq!(o.status, OrderStatus::Open);
        assert_eq!(o.repair_location, RepairLocation::Rc);
        assert_eq!(o.rejection_reason.as_deref(), Some("No engineer on site"));
        assert_eq!(o.rejected_by, Some(staff));
        assert!(plan.effects().iter().any(|e| matches!(
            e,
            Effect::OnSiteRejected { reason: Some(r), .. } if r == "No engineer on site"
        )));
        assert_eq!(
            plan.order_walk(),
            vec![OrderStatus::PendingApproval, OrderStatus::Open]
        );
        assert!(plan.effects().iter().any(|e| matches!(
            e,
            Effect::RepairLocationChanged {
                location: RepairLocation::Rc,
                ..
            }
        )));
    }

    #[test]
    fn test_request_switches_rc_order_to_on_site() {
        let mut o = order(RepairLocation::Rc);
        let mut plan = EffectPlan::new();
        plan_request(&mut o, &mut plan).unwrap();
        assert_eq!(o.repair_location, RepairLocation::OnSite);
        plan_approve(&mut o, &mut plan).unwrap();
        assert_eq!(o.status, OrderStatus::ApprovedOnSite);
    }

    #[test]
    fn test_approval_requires_pending_request() {
        let mut o = order(RepairLocation::OnSite);
        let mut plan = EffectPlan::new();
        assert!(matches!(
            plan_approve(&mut o, &mut plan),
            Err(CassetteError::InvalidTransition { .. })
        ));
        assert!(plan.is_empty());
    }
}

//! # Service Order State Machine
//!
//! Adjacency table for service orders. Both the RC flow
//! (`OPEN → IN_DELIVERY → RECEIVED → IN_PROGRESS → RESOLVED → CLOSED`) and the
//! on-site flow (`OPEN → PENDING_APPROVAL → APPROVED_ON_SITE → IN_PROGRESS →
//! RESOLVED → CLOSED`) are encoded here and nowhere else. Self-delivery
//! (`OPEN → RECEIVED`) and on-site rejection (`PENDING_APPROVAL → OPEN`) are
//! the only other edges.

use crate::error::{CassetteError, Result};
use crate::models::ServiceOrder;
use crate::state_machine::effects::{Effect, EffectPlan};
use crate::state_machine::events::OrderEvent;
use crate::state_machine::states::{OrderStatus, RepairLocation};

/// `(from, event, to)`
pub const ORDER_TRANSITIONS: &[(OrderStatus, OrderEvent, OrderStatus)] = &[
    (OrderStatus::Open, OrderEvent::Ship, OrderStatus::InDelivery),
    (OrderStatus::Open, OrderEvent::ReceiveAtRc, OrderStatus::Received),
    (OrderStatus::InDelivery, OrderEvent::ReceiveAtRc, OrderStatus::Received),
    (OrderStatus::Open, OrderEvent::RequestOnSite, OrderStatus::PendingApproval),
    (OrderStatus::PendingApproval, OrderEvent::ApproveOnSite, OrderStatus::ApprovedOnSite),
    (OrderStatus::PendingApproval, OrderEvent::RejectOnSite, OrderStatus::Open),
    (OrderStatus::Received, OrderEvent::StartRepair, OrderStatus::InProgress),
    (OrderStatus::ApprovedOnSite, OrderEvent::StartRepair, OrderStatus::InProgress),
    (OrderStatus::InProgress, OrderEvent::RepairsSettled, OrderStatus::Resolved),
    (OrderStatus::Resolved, OrderEvent::ConfirmReturn, OrderStatus::Closed),
];

pub struct OrderStateMachine;

impl OrderStateMachine {
    pub fn next(current: OrderStatus, event: OrderEvent) -> Option<OrderStatus> {
        ORDER_TRANSITIONS
            .iter()
            .find(|(from, e, _)| *from == current && *e == event)
            .map(|(_, _, to)| *to)
    }

    /// The event that leads from `current` to `target`, if that edge exists
    pub fn event_for(current: OrderStatus, target: OrderStatus) -> Option<OrderEvent> {
        ORDER_TRANSITIONS
            .iter()
            .find(|(from, _, to)| *from == current && *to == target)
            .map(|(_, event, _)| *event)
    }

    pub fn legal_targets(current: OrderStatus) -> Vec<OrderStatus> {
        ORDER_TRANSITIONS
            .iter()
            .filter(|(from, _, _)| *from == current)
            .map(|(_, _, to)| *to)
            .collect()
    }

    /// Move the (locked) order along one edge and record it in `plan`.
    ///
    /// Enforces the repair-location invariant: on-site orders can only start
    /// repair from `APPROVED_ON_SITE`, RC orders only from `RECEIVED`.
    pub fn transition(
        order: &mut ServiceOrder,
        event: OrderEvent,
        plan: &mut EffectPlan,
    ) -> Result<OrderStatus> {
        let from = order.status;
        let to = Self::next(from, event).ok_or_else(|| CassetteError::InvalidTransition {
            entity: "service_order",
            from: from.to_string(),
            to: event.to_string(),
        })?;

        let location_ok = match (from, event) {
            (OrderStatus::ApprovedOnSite, OrderEvent::StartRepair) => {
                order.repair_location == RepairLocation::OnSite
            }
            (OrderStatus::Received, OrderEvent::StartRepair)
            | (OrderStatus::Open, OrderEvent::Ship)
            | (OrderStatus::Open, OrderEvent::ReceiveAtRc) => {
                order.repair_location == RepairLocation::Rc
            }
            _ => true,
        };
        if !location_ok {
            return Err(CassetteError::precondition(format!(
                "Order {} with repair location {} cannot take event {event} from {from}",
                order.ticket_number, order.repair_location
            )));
        }

        order.status = to;
        plan.push(Effect::OrderStatusChanged {
            order_id: order.order_id,
            from,
            to,
            event,
        });

        Ok(to)
    }
}

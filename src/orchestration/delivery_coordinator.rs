//! # Delivery/Return Coordinator
//!
//! Records physical movement between the pengelola and the repair center:
//! courier shipments (`OPEN → IN_DELIVERY`), receipt at the center
//! (`→ RECEIVED`, courier or self-delivery) and the combined pickup/disposal
//! Return that closes a resolved order.

use uuid::Uuid;

use crate::database::UnitOfWork;
use crate::error::{CassetteError, Result};
use crate::logging::{log_error, log_order_operation};
use crate::models::{
    Delivery, DeliveryRequest, PickupConfirmation, ReturnItem, ReturnKind, ReturnRecord,
    ServiceOrder,
};
use crate::orchestration::core::{LockedCassettes, OrchestrationContext};
use crate::orchestration::service_order_manager::{lock_order, recompute_aggregate};
use crate::services::{Action, Actor};
use crate::state_machine::effects::{Effect, EffectPlan};
use crate::state_machine::events::{CassetteEvent, OrderEvent};
use crate::state_machine::guards::{NoReturnRecordedGuard, StateGuard};
use crate::state_machine::order_state_machine::OrderStateMachine;
use crate::state_machine::states::{CassetteStatus, OrderStatus};

#[derive(Debug, Clone)]
pub struct DeliveryReturnCoordinator {
    context: OrchestrationContext,
}

impl DeliveryReturnCoordinator {
    pub fn new(context: OrchestrationContext) -> Self {
        Self { context }
    }

    /// Register a courier shipment for an `OPEN` RC order.
    /// Every cassette of the order moves to `IN_TRANSIT`.
    pub async fn create_delivery(
        &self,
        actor: &Actor,
        request: DeliveryRequest,
    ) -> Result<Delivery> {
        self.context.authorize(actor, Action::CreateDelivery).await?;
        self.ship(actor, request)
            .await
            .inspect_err(|e| log_error("delivery.create", e))
    }

    async fn ship(&self, actor: &Actor, request: DeliveryRequest) -> Result<Delivery> {
        if request.courier.courier_name.trim().is_empty() {
            return Err(CassetteError::validation("courier_name is required"));
        }

        let mut uow = self.context.begin().await?;
        let mut order = lock_order(uow.as_mut(), request.order_id).await?;

        if !order.cassette_ids().contains(&request.cassette_id) {
            return Err(CassetteError::validation(format!(
                "Cassette {} is not part of order {}",
                request.cassette_id, order.ticket_number
            )));
        }
        if uow.find_delivery(order.order_id).await?.is_some() {
            return Err(CassetteError::conflict(format!(
                "Order {} already has a delivery record",
                order.ticket_number
            )));
        }

        let cassette_ids = order.cassette_ids();
        let mut cassettes = LockedCassettes::lock(uow.as_mut(), &cassette_ids).await?;

        let mut plan = EffectPlan::new();
        OrderStateMachine::transition(&mut order, OrderEvent::Ship, &mut plan)?;
        for id in cassette_ids {
            cassettes.apply(id, CassetteEvent::Ship, &mut plan)?;
        }

        let delivery = Delivery::by_courier(&request, actor.actor_id);
        plan.push(Effect::DeliveryRecorded(delivery.clone()));

        self.context.commit(uow, &plan, actor).await?;

        log_order_operation(
            "create_delivery",
            Some(order.order_id),
            Some(&order.ticket_number),
            order.status.as_str(),
            Some(&request.courier.courier_name),
        );
        Ok(delivery)
    }

    /// Confirm arrival at the repair center.
    ///
    /// Accepts courier deliveries (`IN_DELIVERY`) and self-delivery straight
    /// from `OPEN`. Repeating the call on an order that was already received
    /// returns the existing record unchanged.
    pub async fn receive_delivery(
        &self,
        actor: &Actor,
        order_id: Uuid,
        notes: Option<String>,
    ) -> Result<Delivery> {
        self.context.authorize(actor, Action::ReceiveDelivery).await?;
        self.receive(actor, order_id, notes)
            .await
            .inspect_err(|e| log_error("delivery.receive", e))
    }

    async fn receive(
        &self,
        actor: &Actor,
        order_id: Uuid,
        notes: Option<String>,
    ) -> Result<Delivery> {
        let mut uow = self.context.begin().await?;
        let mut order = lock_order(uow.as_mut(), order_id).await?;

        if !matches!(order.status, OrderStatus::Open | OrderStatus::InDelivery) {
            if let Some(delivery) = uow.find_delivery(order_id).await? {
                if delivery.is_received() {
                    tracing::debug!(
                        order_id = %order_id,
                        status = %order.status,
                        "Delivery already received"
                    );
                    return Ok(delivery);
                }
            }
        }

        let mut plan = EffectPlan::new();
        let delivery = plan_receive(uow.as_mut(), &mut order, actor, notes, &mut plan).await?;
        self.context.commit(uow, &plan, actor).await?;

        log_order_operation(
            "receive_delivery",
            Some(order.order_id),
            Some(&order.ticket_number),
            order.status.as_str(),
            Some(if delivery.self_delivery {
                "self delivery"
            } else {
                "courier delivery"
            }),
        );
        Ok(delivery)
    }

    /// Confirm pickup and/or disposal for a `RESOLVED` order and close it.
    ///
    /// Cassettes `READY_FOR_PICKUP` are handed back (`→ OK`) against the
    /// recipient's signature; `SCRAPPED` cassettes are recorded as disposed
    /// and stay `SCRAPPED`. Mixed orders get one combined record.
    pub async fn create_return(
        &self,
        actor: &Actor,
        order_id: Uuid,
        confirmation: PickupConfirmation,
    ) -> Result<ReturnRecord> {
        self.context.authorize(actor, Action::ConfirmPickup).await?;
        self.record_return(actor, order_id, confirmation)
            .await
            .inspect_err(|e| log_error("return.create", e))
    }

    async fn record_return(
        &self,
        actor: &Actor,
        order_id: Uuid,
        confirmation: PickupConfirmation,
    ) -> Result<ReturnRecord> {
        let mut uow = self.context.begin().await?;
        let mut order = lock_order(uow.as_mut(), order_id).await?;
        let mut cassettes =
            LockedCassettes::lock(uow.as_mut(), &order.referenced_cassette_ids()).await?;

        let mut plan = EffectPlan::new();
        recompute_aggregate(uow.as_mut(), &mut order, &mut plan).await?;
        if order.status != OrderStatus::Resolved {
            return Err(CassetteError::precondition(format!(
                "Order {} must be RESOLVED to confirm pickup (currently {})",
                order.ticket_number, order.status
            )));
        }
        NoReturnRecordedGuard.check(&order, uow.as_mut()).await?;

        let items = return_items(&order, &cassettes)?;
        let record = ReturnRecord {
            return_id: Uuid::new_v4(),
            order_id,
            items,
            recipient_name: non_blank(confirmation.recipient_name),
            recipient_signature: non_blank(confirmation.recipient_signature),
            confirmed_by: actor.actor_id,
            notes: confirmation.notes,
            confirmed_at: chrono::Utc::now(),
        };

        if record.has_pickups()
            && (record.recipient_name.is_none() || record.recipient_signature.is_none())
        {
            return Err(CassetteError::validation(
                "Pickup requires the recipient name and signature",
            ));
        }

        for item in &record.items {
            let event = match item.kind {
                ReturnKind::Pickup => CassetteEvent::PickedUp,
                ReturnKind::Disposal => CassetteEvent::Disposed,
            };
            cassettes.apply(item.cassette_id, event, &mut plan)?;
        }
        plan.push(Effect::ReturnRecorded(record.clone()));
        OrderStateMachine::transition(&mut order, OrderEvent::ConfirmReturn, &mut plan)?;

        self.context.commit(uow, &plan, actor).await?;

        log_order_operation(
            "confirm_pickup",
            Some(order.order_id),
            Some(&order.ticket_number),
            order.status.as_str(),
            Some(&format!("{} item(s)", record.items.len())),
        );
        Ok(record)
    }

    pub async fn get_delivery(&self, actor: &Actor, order_id: Uuid) -> Result<Delivery> {
        self.context.authorize(actor, Action::ReadOrder).await?;
        let mut uow = self.context.begin().await?;
        uow.find_delivery(order_id)
            .await?
            .ok_or_else(|| CassetteError::not_found("delivery", order_id))
    }

    pub async fn get_return(&self, actor: &Actor, order_id: Uuid) -> Result<ReturnRecord> {
        self.context.authorize(actor, Action::ReadOrder).await?;
        let mut uow = self.context.begin().await?;
        uow.find_return(order_id)
            .await?
            .ok_or_else(|| CassetteError::not_found("return", order_id))
    }
}

/// Receive every cassette of the (locked) order at the repair center and
/// record the delivery, creating a self-delivery record if none exists
pub(crate) async fn plan_receive(
    uow: &mut dyn UnitOfWork,
    order: &mut ServiceOrder,
    actor: &Actor,
    notes: Option<String>,
    plan: &mut EffectPlan,
) -> Result<Delivery> {
    OrderStateMachine::transition(order, OrderEvent::ReceiveAtRc, plan)?;

    let cassette_ids = order.cassette_ids();
    let mut cassettes = LockedCassettes::lock(uow, &cassette_ids).await?;
    for id in cassette_ids {
        cassettes.apply(id, CassetteEvent::ReceiveAtRc, plan)?;
    }

    let mut delivery = match uow.find_delivery(order.order_id).await? {
        Some(existing) => existing,
        None => Delivery::self_delivered(order.order_id, actor.actor_id),
    };
    delivery.mark_received(actor.actor_id, notes);
    plan.push(Effect::DeliveryRecorded(delivery.clone()));

    Ok(delivery)
}

/// One item per returned cassette, plus a disposal item for every original
/// cassette retired in favour of a replacement
fn return_items(order: &ServiceOrder, cassettes: &LockedCassettes) -> Result<Vec<ReturnItem>> {
    let mut items = Vec::new();

    for detail in &order.details {
        let returned = detail.returned_cassette_id();
        let kind = match cassettes.status(returned)? {
            CassetteStatus::ReadyForPickup => ReturnKind::Pickup,
            CassetteStatus::Scrapped => ReturnKind::Disposal,
            other => {
                return Err(CassetteError::precondition(format!(
                    "Cassette {returned} is {other}; only READY_FOR_PICKUP or SCRAPPED cassettes can be returned"
                )))
            }
        };
        items.push(ReturnItem {
            detail_id: detail.detail_id,
            cassette_id: returned,
            kind,
        });

        if returned != detail.cassette_id {
            items.push(ReturnItem {
                detail_id: detail.detail_id,
                cassette_id: detail.cassette_id,
                kind: ReturnKind::Disposal,
            });
        }
    }

    Ok(items)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  ".to_string())), None);
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some("Budi".to_string())), Some("Budi".to_string()));
    }
}

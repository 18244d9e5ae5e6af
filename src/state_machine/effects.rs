//! # Transition Effects
//!
//! Every lifecycle operation plans its writes as an ordered list of
//! [`Effect`]s before touching storage. [`apply_effects`] is the single step
//! that turns the list into row writes inside one unit of work, so a cascade
//! (repair completion → cassette status → order aggregate) either commits as
//! a whole or not at all.
//!
//! Effects are also the source of audit entries and published domain events,
//! which are emitted only after the unit of work commits.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::database::UnitOfWork;
use crate::error::Result;
use crate::models::{
    Delivery, OrderTransition, PreventiveMaintenance, RepairTicket, ReturnRecord, ServiceOrder,
};
use crate::state_machine::events::{CassetteEvent, OrderEvent};
use crate::state_machine::states::{
    CassetteStatus, OrderStatus, PmStatus, RepairLocation, RepairStatus,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CassetteStatusChanged {
        cassette_id: Uuid,
        from: CassetteStatus,
        to: CassetteStatus,
        event: CassetteEvent,
    },
    OrderOpened(ServiceOrder),
    OrderStatusChanged {
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        event: OrderEvent,
    },
    RepairLocationChanged {
        order_id: Uuid,
        location: RepairLocation,
    },
    OnSiteRejected {
        order_id: Uuid,
        rejected_by: Uuid,
        reason: Option<String>,
    },
    OrderCancelled {
        order_id: Uuid,
        reason: String,
    },
    ReplacementBound {
        order_id: Uuid,
        detail_id: Uuid,
        replacement_cassette_id: Uuid,
    },
    RepairTicketCreated(RepairTicket),
    RepairTicketUpdated {
        ticket: RepairTicket,
        from: RepairStatus,
    },
    RepairTicketsVoided {
        order_id: Uuid,
    },
    DeliveryRecorded(Delivery),
    ReturnRecorded(ReturnRecord),
    PmScheduled(PreventiveMaintenance),
    PmUpdated {
        pm: PreventiveMaintenance,
        from: PmStatus,
    },
    PmDeleted(PreventiveMaintenance),
}

impl Effect {
    pub fn entity_type(&self) -> &'static str {
        match self {
            Self::CassetteStatusChanged { .. } => "cassette",
            Self::OrderOpened(_)
            | Self::OrderStatusChanged { .. }
            | Self::RepairLocationChanged { .. }
            | Self::OnSiteRejected { .. }
            | Self::OrderCancelled { .. }
            | Self::ReplacementBound { .. } => "service_order",
            Self::RepairTicketCreated(_)
            | Self::RepairTicketUpdated { .. }
            | Self::RepairTicketsVoided { .. } => "repair_ticket",
            Self::DeliveryRecorded(_) => "delivery",
            Self::ReturnRecorded(_) => "return",
            Self::PmScheduled(_) | Self::PmUpdated { .. } | Self::PmDeleted(_) => {
                "preventive_maintenance"
            }
        }
    }

    pub fn entity_id(&self) -> Uuid {
        match self {
            Self::CassetteStatusChanged { cassette_id, .. } => *cassette_id,
            Self::OrderOpened(order) => order.order_id,
            Self::OrderStatusChanged { order_id, .. }
            | Self::RepairLocationChanged { order_id, .. }
            | Self::OnSiteRejected { order_id, .. }
            | Self::OrderCancelled { order_id, .. }
            | Self::ReplacementBound { order_id, .. }
            | Self::RepairTicketsVoided { order_id } => *order_id,
            Self::RepairTicketCreated(ticket) | Self::RepairTicketUpdated { ticket, .. } => {
                ticket.repair_id
            }
            Self::DeliveryRecorded(delivery) => delivery.delivery_id,
            Self::ReturnRecorded(record) => record.return_id,
            Self::PmScheduled(pm) | Self::PmUpdated { pm, .. } | Self::PmDeleted(pm) => pm.pm_id,
        }
    }

    /// Dotted action name used for audit entries and published events
    pub fn action(&self) -> &'static str {
        match self {
            Self::CassetteStatusChanged { .. } => "cassette.status_changed",
            Self::OrderOpened(_) => "service_order.opened",
            Self::OrderStatusChanged { .. } => "service_order.status_changed",
            Self::RepairLocationChanged { .. } => "service_order.repair_location_changed",
            Self::OnSiteRejected { .. } => "service_order.on_site_rejected",
            Self::OrderCancelled { .. } => "service_order.cancelled",
            Self::ReplacementBound { .. } => "service_order.replacement_bound",
            Self::RepairTicketCreated(_) => "repair_ticket.created",
            Self::RepairTicketUpdated { .. } => "repair_ticket.updated",
            Self::RepairTicketsVoided { .. } => "repair_ticket.voided",
            Self::DeliveryRecorded(_) => "delivery.recorded",
            Self::ReturnRecorded(_) => "return.recorded",
            Self::PmScheduled(_) => "preventive_maintenance.scheduled",
            Self::PmUpdated { .. } => "preventive_maintenance.updated",
            Self::PmDeleted(_) => "preventive_maintenance.deleted",
        }
    }

    /// JSON payload handed to the event publisher
    pub fn event_context(&self) -> Value {
        match self {
            Self::CassetteStatusChanged {
                cassette_id,
                from,
                to,
                event,
            } => json!({
                "cassette_id": cassette_id,
                "from": from,
                "to": to,
                "event": event,
            }),
            Self::OrderOpened(order) => json!({
                "order_id": order.order_id,
                "ticket_number": order.ticket_number,
                "repair_location": order.repair_location,
                "cassette_ids": order.cassette_ids(),
            }),
            Self::OrderStatusChanged {
                order_id,
                from,
                to,
                event,
            } => json!({
                "order_id": order_id,
                "from": from,
                "to": to,
                "event": event,
            }),
            Self::RepairLocationChanged { order_id, location } => json!({
                "order_id": order_id,
                "repair_location": location,
            }),
            Self::OnSiteRejected {
                order_id,
                rejected_by,
                reason,
            } => json!({
                "order_id": order_id,
                "rejected_by": rejected_by,
                "reason": reason,
            }),
            Self::OrderCancelled { order_id, reason } => json!({
                "order_id": order_id,
                "reason": reason,
            }),
            Self::ReplacementBound {
                order_id,
                detail_id,
                replacement_cassette_id,
            } => json!({
                "order_id": order_id,
                "detail_id": detail_id,
                "replacement_cassette_id": replacement_cassette_id,
            }),
            Self::RepairTicketCreated(ticket) => json!({
                "repair_id": ticket.repair_id,
                "order_id": ticket.order_id,
                "cassette_id": ticket.cassette_id,
            }),
            Self::RepairTicketUpdated { ticket, from } => json!({
                "repair_id": ticket.repair_id,
                "order_id": ticket.order_id,
                "from": from,
                "to": ticket.status,
                "qc_outcome": ticket.qc_outcome,
            }),
            Self::RepairTicketsVoided { order_id } => json!({ "order_id": order_id }),
            Self::DeliveryRecorded(delivery) => json!({
                "delivery_id": delivery.delivery_id,
                "order_id": delivery.order_id,
                "self_delivery": delivery.self_delivery,
                "received": delivery.received_at.is_some(),
            }),
            Self::ReturnRecorded(record) => json!({
                "return_id": record.return_id,
                "order_id": record.order_id,
                "items": record.items,
            }),
            Self::PmScheduled(pm) | Self::PmDeleted(pm) => json!({
                "pm_id": pm.pm_id,
                "status": pm.status,
                "cassette_ids": pm.cassette_ids(),
            }),
            Self::PmUpdated { pm, from } => json!({
                "pm_id": pm.pm_id,
                "from": from,
                "to": pm.status,
            }),
        }
    }
}

/// Ordered list of writes planned by one operation
#[derive(Debug, Default, Clone)]
pub struct EffectPlan {
    effects: Vec<Effect>,
}

impl EffectPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Cassette status changes in plan order, for assertions and logging
    pub fn cassette_changes(&self) -> Vec<(Uuid, CassetteStatus)> {
        self.effects
            .iter()
            .filter_map(|e| match e {
                Effect::CassetteStatusChanged {
                    cassette_id, to, ..
                } => Some((*cassette_id, *to)),
                _ => None,
            })
            .collect()
    }

    /// `tickets` as they will look once this plan is applied
    pub fn overlay_tickets(&self, mut tickets: Vec<RepairTicket>) -> Vec<RepairTicket> {
        for effect in &self.effects {
            match effect {
                Effect::RepairTicketCreated(ticket) | Effect::RepairTicketUpdated { ticket, .. } => {
                    match tickets.iter_mut().find(|t| t.repair_id == ticket.repair_id) {
                        Some(existing) => *existing = ticket.clone(),
                        None => tickets.push(ticket.clone()),
                    }
                }
                Effect::RepairTicketsVoided { order_id } => {
                    tickets.retain(|t| t.order_id != *order_id);
                }
                _ => {}
            }
        }
        tickets
    }

    /// Repair tickets created by this plan
    pub fn created_tickets(&self) -> Vec<RepairTicket> {
        self.effects
            .iter()
            .filter_map(|e| match e {
                Effect::RepairTicketCreated(ticket) => Some(ticket.clone()),
                _ => None,
            })
            .collect()
    }

    /// Order statuses walked by this plan, in order
    pub fn order_walk(&self) -> Vec<OrderStatus> {
        self.effects
            .iter()
            .filter_map(|e| match e {
                Effect::OrderStatusChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }
}

/// Execute every planned effect against the unit of work, in order.
///
/// This is the only place cassette status is written.
pub async fn apply_effects(
    uow: &mut dyn UnitOfWork,
    plan: &EffectPlan,
    actor_id: Uuid,
    at: DateTime<Utc>,
) -> Result<()> {
    for effect in plan.effects() {
        match effect {
            Effect::CassetteStatusChanged {
                cassette_id,
                from,
                to,
                event,
            } => {
                uow.update_cassette_status(*cassette_id, *to, at).await?;
                crate::logging::log_cassette_transition(*cassette_id, *from, *to, *event);
            }
            Effect::OrderOpened(order) => {
                uow.insert_order(order).await?;
                uow.insert_order_transition(&OrderTransition {
                    transition_id: Uuid::new_v4(),
                    order_id: order.order_id,
                    from_state: None,
                    to_state: order.status,
                    event: None,
                    sort_key: 0,
                    most_recent: true,
                    actor_id: Some(actor_id),
                    created_at: at,
                })
                .await?;
            }
            Effect::OrderStatusChanged {
                order_id,
                from,
                to,
                event,
            } => {
                uow.update_order_status(*order_id, *to, at).await?;
                uow.insert_order_transition(&OrderTransition {
                    transition_id: Uuid::new_v4(),
                    order_id: *order_id,
                    from_state: Some(*from),
                    to_state: *to,
                    event: Some(*event),
                    sort_key: 0,
                    most_recent: true,
                    actor_id: Some(actor_id),
                    created_at: at,
                })
                .await?;
            }
            Effect::RepairLocationChanged { order_id, location } => {
                uow.update_order_location(*order_id, *location, at).await?;
            }
            Effect::OnSiteRejected {
                order_id,
                rejected_by,
                reason,
            } => {
                uow.record_on_site_rejection(*order_id, reason.as_deref(), *rejected_by, at)
                    .await?;
            }
            Effect::OrderCancelled { order_id, reason } => {
                uow.soft_delete_order(*order_id, reason, actor_id, at)
                    .await?;
            }
            Effect::ReplacementBound {
                detail_id,
                replacement_cassette_id,
                ..
            } => {
                uow.bind_replacement(*detail_id, *replacement_cassette_id)
                    .await?;
            }
            Effect::RepairTicketCreated(ticket) => {
                uow.insert_repair_ticket(ticket).await?;
            }
            Effect::RepairTicketUpdated { ticket, .. } => {
                uow.update_repair_ticket(ticket).await?;
            }
            Effect::RepairTicketsVoided { order_id } => {
                uow.void_repair_tickets(*order_id, at).await?;
            }
            Effect::DeliveryRecorded(delivery) => {
                uow.save_delivery(delivery).await?;
            }
            Effect::ReturnRecorded(record) => {
                uow.insert_return(record).await?;
            }
            Effect::PmScheduled(pm) => {
                uow.insert_pm(pm).await?;
            }
            Effect::PmUpdated { pm, .. } | Effect::PmDeleted(pm) => {
                uow.update_pm(pm).await?;
            }
        }

        tracing::debug!(
            action = effect.action(),
            entity_type = effect.entity_type(),
            entity_id = %effect.entity_id(),
            "Applied effect"
        );
    }

    Ok(())
}

use async_trait::async_trait;
use uuid::Uuid;

use crate::database::UnitOfWork;
use crate::error::{CassetteError, Result};
use crate::models::{RepairTicket, ServiceOrder};
use crate::state_machine::effects::EffectPlan;
use crate::state_machine::states::RepairStatus;

/// Cross-entity check evaluated inside the operation's unit of work, after
/// the rows it depends on have been locked.
#[async_trait]
pub trait StateGuard<T: ?Sized + Sync> {
    async fn check(&self, entity: &T, uow: &mut dyn UnitOfWork) -> Result<()>;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// A cassette may be referenced by at most one open service order
pub struct NoOpenOrderGuard {
    /// The order being modified, which may already reference the cassettes
    pub except_order: Option<Uuid>,
}

#[async_trait]
impl StateGuard<[Uuid]> for NoOpenOrderGuard {
    async fn check(&self, cassette_ids: &[Uuid], uow: &mut dyn UnitOfWork) -> Result<()> {
        let open = uow.open_orders_for_cassettes(cassette_ids).await?;
        let blocking: Vec<&ServiceOrder> = open
            .iter()
            .filter(|o| Some(o.order_id) != self.except_order)
            .collect();

        if let Some(order) = blocking.first() {
            let cassette = order
                .referenced_cassette_ids()
                .into_iter()
                .find(|id| cassette_ids.contains(id))
                .unwrap_or_default();
            return Err(CassetteError::conflict(format!(
                "Cassette {cassette} is already referenced by open service order {}",
                order.ticket_number
            )));
        }

        Ok(())
    }

    fn description(&self) -> &'static str {
        "Cassettes must not be referenced by another open service order"
    }
}

/// A cassette may have at most one non-terminal repair ticket
pub struct NoActiveRepairTicketGuard;

#[async_trait]
impl StateGuard<[Uuid]> for NoActiveRepairTicketGuard {
    async fn check(&self, cassette_ids: &[Uuid], uow: &mut dyn UnitOfWork) -> Result<()> {
        let active = uow.active_repair_tickets_for_cassettes(cassette_ids).await?;
        if let Some(ticket) = active.first() {
            return Err(CassetteError::conflict(format!(
                "Cassette {} already has active repair ticket {} ({})",
                ticket.cassette_id, ticket.repair_id, ticket.status
            )));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Cassettes must not have an active repair ticket"
    }
}

/// A cassette may have at most one non-terminal PM task
pub struct NoActivePmGuard;

#[async_trait]
impl StateGuard<[Uuid]> for NoActivePmGuard {
    async fn check(&self, cassette_ids: &[Uuid], uow: &mut dyn UnitOfWork) -> Result<()> {
        let active = uow.active_pms_for_cassettes(cassette_ids).await?;
        if let Some(pm) = active.first() {
            let cassette = pm
                .cassette_ids()
                .into_iter()
                .find(|id| cassette_ids.contains(id))
                .unwrap_or_default();
            return Err(CassetteError::conflict(format!(
                "cannot create simultaneous PM: cassette {cassette} already has PM {} ({})",
                pm.pm_number, pm.status
            )));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Cassettes must not have an active PM task"
    }
}

/// Every detail of the order has a completed repair or a bound replacement
pub struct AllDetailsSettledGuard;

#[async_trait]
impl StateGuard<ServiceOrder> for AllDetailsSettledGuard {
    async fn check(&self, order: &ServiceOrder, uow: &mut dyn UnitOfWork) -> Result<()> {
        let unsettled = unsettled_details(order, uow, &EffectPlan::new()).await?;
        if unsettled > 0 {
            return Err(CassetteError::precondition(format!(
                "Order {} has {unsettled} cassette detail(s) without a completed repair or replacement",
                order.ticket_number
            )));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "All order details must be settled"
    }
}

/// The order has no Return record yet
pub struct NoReturnRecordedGuard;

#[async_trait]
impl StateGuard<ServiceOrder> for NoReturnRecordedGuard {
    async fn check(&self, order: &ServiceOrder, uow: &mut dyn UnitOfWork) -> Result<()> {
        if uow.find_return(order.order_id).await?.is_some() {
            return Err(CassetteError::conflict(format!(
                "Return already recorded for order {}",
                order.ticket_number
            )));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Order must not already have a Return record"
    }
}

/// Count details that are neither repaired nor replaced, taking ticket
/// changes already planned in `plan` into account
pub async fn unsettled_details(
    order: &ServiceOrder,
    uow: &mut dyn UnitOfWork,
    plan: &EffectPlan,
) -> Result<usize> {
    let stored = uow.repair_tickets_for_order(order.order_id).await?;
    Ok(count_unsettled(order, &plan.overlay_tickets(stored)))
}

/// A detail is settled by a bound replacement or a completed repair ticket
pub fn count_unsettled(order: &ServiceOrder, tickets: &[RepairTicket]) -> usize {
    order
        .details
        .iter()
        .filter(|detail| {
            if detail.replacement_cassette_id.is_some() {
                return false;
            }
            if !detail.needs_repair_ticket() {
                return true;
            }
            !tickets.iter().any(|t| {
                t.cassette_id == detail.cassette_id
                    && t.deleted_at.is_none()
                    && t.status == RepairStatus::Completed
            })
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewOrderDetail, NewServiceOrder};
    use crate::state_machine::states::{OrderPriority, RepairLocation};

    fn order_with(details: &[(Uuid, bool)]) -> ServiceOrder {
        ServiceOrder::open(
            &NewServiceOrder {
                reporter_id: Uuid::new_v4(),
                repair_location: RepairLocation::Rc,
                priority: OrderPriority::Medium,
                description: None,
                cassettes: details
                    .iter()
                    .map(|(cassette_id, replacement)| NewOrderDetail {
                        cassette_id: *cassette_id,
                        request_replacement: *replacement,
                        problem_notes: None,
                    })
                    .collect(),
            },
            "SO-20260301-000001".to_string(),
        )
    }

    #[test]
    fn test_count_unsettled() {
        let repaired = Uuid::new_v4();
        let replaced = Uuid::new_v4();
        let mut order = order_with(&[(repaired, false), (replaced, true)]);

        let mut ticket = RepairTicket::for_cassette(order.order_id, repaired);
        assert_eq!(count_unsettled(&order, &[ticket.clone()]), 2);

        ticket.status = RepairStatus::Completed;
        assert_eq!(count_unsettled(&order, &[ticket.clone()]), 1);

        order.details[1].replacement_cassette_id = Some(Uuid::new_v4());
        assert_eq!(count_unsettled(&order, &[ticket]), 0);
    }

    #[test]
    fn test_guard_descriptions() {
        assert_eq!(
            NoActivePmGuard.description(),
            "Cassettes must not have an active PM task"
        );
        assert_eq!(
            AllDetailsSettledGuard.description(),
            "All order details must be settled"
        );
        assert_eq!(
            NoOpenOrderGuard { except_order: None }.description(),
            "Cassettes must not be referenced by another open service order"
        );
    }
}

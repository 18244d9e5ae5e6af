mod common;

use common::strategies::*;
use proptest::prelude::*;

use cassette_core::models::{NewOrderDetail, NewServiceOrder, ServiceOrder};
use cassette_core::state_machine::effects::EffectPlan;
use cassette_core::state_machine::order_state_machine::{OrderStateMachine, ORDER_TRANSITIONS};
use cassette_core::state_machine::cassette_state_machine::CassetteStateTracker;
use cassette_core::state_machine::states::{
    CassetteStatus, OrderPriority, OrderStatus, RepairLocation,
};
use uuid::Uuid;

fn fresh_order(location: RepairLocation) -> ServiceOrder {
    ServiceOrder::open(
        &NewServiceOrder {
            reporter_id: Uuid::new_v4(),
            repair_location: location,
            priority: OrderPriority::Medium,
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

proptest! {
    /// Property: any event sequence only ever walks table edges, and a
    /// rejected event leaves the order and the plan untouched
    #[test]
    fn order_walks_follow_table_edges(
        events in order_event_sequence_strategy(),
        on_site in any::<bool>(),
    ) {
        let location = if on_site { RepairLocation::OnSite } else { RepairLocation::Rc };
        let mut order = fresh_order(location);
        let mut plan = EffectPlan::new();

        for event in events {
            let before = order.status;
            let effects_before = plan.effects().len();
            match OrderStateMachine::transition(&mut order, event, &mut plan) {
                Ok(after) => {
                    prop_assert!(ORDER_TRANSITIONS.contains(&(before, event, after)));
                    prop_assert_eq!(order.status, after);
                }
                Err(_) => {
                    prop_assert_eq!(order.status, before);
                    prop_assert_eq!(plan.effects().len(), effects_before);
                }
            }
        }

        let walk = plan.order_walk();
        let mut from = OrderStatus::Open;
        for to in walk {
            prop_assert!(OrderStateMachine::event_for(from, to).is_some());
            from = to;
        }
    }

    /// Property: CLOSED is terminal
    #[test]
    fn closed_orders_accept_no_event(event in order_event_strategy()) {
        prop_assert!(OrderStateMachine::next(OrderStatus::Closed, event).is_none());
    }

    /// Property: cassettes only move along tracker edges; SCRAPPED never
    /// leaves SCRAPPED
    #[test]
    fn cassette_walks_follow_tracker_table(
        start in cassette_status_strategy(),
        events in cassette_event_sequence_strategy(),
    ) {
        let mut status = start;
        for event in events {
            match CassetteStateTracker::next_status(status, event) {
                Some(next) => {
                    prop_assert!(CassetteStateTracker::permits(status, event));
                    if status == CassetteStatus::Scrapped {
                        prop_assert_eq!(next, CassetteStatus::Scrapped);
                    }
                    status = next;
                }
                None => prop_assert!(!CassetteStateTracker::permits(status, event)),
            }
        }
    }
}

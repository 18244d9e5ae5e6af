//! Repair ticket workflow and its effect on cassettes and orders.

mod common;

use common::*;
use cassette_core::error::CassetteError;
use cassette_core::state_machine::states::{CassetteStatus, OrderStatus, QcOutcome, RepairStatus};

#[tokio::test]
async fn test_bulk_creation_is_rejected_twice() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(3).await;
    let order = h.received_order(&cassettes).await;

    let tickets = h
        .core
        .repairs
        .create_bulk_from_order(&h.staff, order.order_id)
        .await
        .unwrap();
    assert_eq!(tickets.len(), 3);
    assert!(tickets.iter().all(|t| t.status == RepairStatus::Received));

    let err = h
        .core
        .repairs
        .create_bulk_from_order(&h.staff, order.order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, CassetteError::Conflict(_)));
    assert_eq!(
        h.core
            .repairs
            .repair_tickets_for_order(&h.staff, order.order_id)
            .await
            .unwrap()
            .len(),
        3
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bulk_creation_yields_one_ticket_set() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(2).await;
    let order = h.received_order(&cassettes).await;

    let calls: Vec<_> = (0..8)
        .map(|_| {
            let core = h.core.clone();
            let staff = h.staff.clone();
            tokio::spawn(async move {
                core.repairs
                    .create_bulk_from_order(&staff, order.order_id)
                    .await
            })
        })
        .collect();

    let mut created = 0;
    for call in calls {
        match call.await.unwrap() {
            Ok(tickets) => {
                created += 1;
                assert_eq!(tickets.len(), 2);
            }
            Err(e) => assert!(matches!(e, CassetteError::Conflict(_)), "got {e:?}"),
        }
    }
    assert_eq!(created, 1);

    let tickets = h
        .core
        .repairs
        .repair_tickets_for_order(&h.staff, order.order_id)
        .await
        .unwrap();
    assert_eq!(tickets.len(), 2);
    assert_eq!(h.order(order.order_id).await.status, OrderStatus::InProgress);
}

#[tokio::test]
async fn test_bulk_creation_requires_received_order() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(1).await;
    let order = h.open_order(cassette_core::state_machine::states::RepairLocation::Rc, &cassettes).await;

    let err = h
        .core
        .repairs
        .create_bulk_from_order(&h.staff, order.order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, CassetteError::InvalidTransition { .. }));
    assert_eq!(h.order(order.order_id).await.status, OrderStatus::Open);
}

#[tokio::test]
async fn test_ticket_walks_forward_only() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(1).await;
    let order = h.received_order(&cassettes).await;
    let ticket = h
        .core
        .repairs
        .create_bulk_from_order(&h.staff, order.order_id)
        .await
        .unwrap()
        .remove(0);

    // Cannot complete before diagnosis and repair
    let err = h
        .core
        .repairs
        .complete(&h.staff, ticket.repair_id, completion(true))
        .await
        .unwrap_err();
    assert!(matches!(err, CassetteError::InvalidTransition { .. }));
    assert_eq!(h.cassette_status(cassettes[0]).await, CassetteStatus::InRepair);

    let taken = h
        .core
        .repairs
        .take(&h.staff, ticket.repair_id, None)
        .await
        .unwrap();
    assert_eq!(taken.status, RepairStatus::Diagnosing);
    assert_eq!(taken.engineer_id, Some(h.staff.actor_id));

    let err = h
        .core
        .repairs
        .take(&h.staff, ticket.repair_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CassetteError::InvalidTransition { .. }));

    let started = h.core.repairs.start(&h.staff, ticket.repair_id).await.unwrap();
    assert_eq!(started.status, RepairStatus::OnProgress);
}

#[tokio::test]
async fn test_qc_failure_scraps_cassette() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(1).await;
    let order = h.received_order(&cassettes).await;
    h.core
        .repairs
        .create_bulk_from_order(&h.staff, order.order_id)
        .await
        .unwrap();

    h.repair_all(order.order_id, false).await;

    let ticket = h
        .core
        .repairs
        .repair_tickets_for_order(&h.staff, order.order_id)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(ticket.status, RepairStatus::Completed);
    assert_eq!(ticket.qc_outcome, QcOutcome::Fail);
    assert_eq!(h.cassette_status(cassettes[0]).await, CassetteStatus::Scrapped);
    assert_eq!(h.order(order.order_id).await.status, OrderStatus::Resolved);

    // Disposal only: no signature needed
    let record = h
        .core
        .deliveries
        .create_return(&h.staff, order.order_id, Default::default())
        .await
        .unwrap();
    assert!(!record.has_pickups());
    assert_eq!(h.cassette_status(cassettes[0]).await, CassetteStatus::Scrapped);
    assert_eq!(h.order(order.order_id).await.status, OrderStatus::Closed);
}

#[tokio::test]
async fn test_order_resolves_only_after_last_ticket() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(2).await;
    let order = h.received_order(&cassettes).await;
    let tickets = h
        .core
        .repairs
        .create_bulk_from_order(&h.staff, order.order_id)
        .await
        .unwrap();

    let first = &tickets[0];
    h.core.repairs.take(&h.staff, first.repair_id, None).await.unwrap();
    h.core.repairs.start(&h.staff, first.repair_id).await.unwrap();
    h.core
        .repairs
        .complete(&h.staff, first.repair_id, completion(true))
        .await
        .unwrap();

    assert_eq!(h.order(order.order_id).await.status, OrderStatus::InProgress);
    assert_eq!(
        h.cassette_status(first.cassette_id).await,
        CassetteStatus::ReadyForPickup
    );

    // Pickup is refused while any detail is unsettled
    let err = h
        .core
        .deliveries
        .create_return(&h.staff, order.order_id, signed_pickup())
        .await
        .unwrap_err();
    assert!(matches!(err, CassetteError::PreconditionFailed(_)));

    let second = &tickets[1];
    h.core.repairs.take(&h.staff, second.repair_id, None).await.unwrap();
    h.core.repairs.start(&h.staff, second.repair_id).await.unwrap();
    h.core
        .repairs
        .complete(&h.staff, second.repair_id, completion(true))
        .await
        .unwrap();

    assert_eq!(h.order(order.order_id).await.status, OrderStatus::Resolved);
}

#[tokio::test]
async fn test_reconcile_is_a_no_op_for_consistent_orders() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(1).await;
    let order = h.received_order(&cassettes).await;

    let before = h.audit.entries().await.len();
    let reconciled = h
        .core
        .orders
        .reconcile(&h.staff, order.order_id)
        .await
        .unwrap();
    assert_eq!(reconciled.status, OrderStatus::Received);
    assert_eq!(h.audit.entries().await.len(), before);
}

#[tokio::test]
async fn test_unknown_ticket_is_not_found() {
    let h = TestHarness::new();
    let err = h
        .core
        .repairs
        .get_repair_ticket(&h.staff, uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, CassetteError::NotFound { .. }));
}

//! Courier deliveries, receipt at the repair center and returns.

mod common;

use common::*;
use cassette_core::error::CassetteError;
use cassette_core::models::{PickupConfirmation, ReturnKind};
use cassette_core::state_machine::states::{CassetteStatus, OrderStatus, RepairLocation};
use uuid::Uuid;

#[tokio::test]
async fn test_delivery_validation() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(1).await;
    let order = h.open_order(RepairLocation::Rc, &cassettes).await;

    let mut no_courier = delivery_request(order.order_id, cassettes[0]);
    no_courier.courier.courier_name = "   ".to_string();
    assert!(matches!(
        h.core.deliveries.create_delivery(&h.pengelola, no_courier).await,
        Err(CassetteError::Validation(_))
    ));

    let foreign = delivery_request(order.order_id, Uuid::new_v4());
    assert!(matches!(
        h.core.deliveries.create_delivery(&h.pengelola, foreign).await,
        Err(CassetteError::Validation(_))
    ));

    h.core
        .deliveries
        .create_delivery(&h.pengelola, delivery_request(order.order_id, cassettes[0]))
        .await
        .unwrap();
    let duplicate = h
        .core
        .deliveries
        .create_delivery(&h.pengelola, delivery_request(order.order_id, cassettes[0]))
        .await
        .unwrap_err();
    assert!(matches!(duplicate, CassetteError::Conflict(_)));
}

#[tokio::test]
async fn test_on_site_orders_are_not_shipped() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(1).await;
    let order = h.open_order(RepairLocation::OnSite, &cassettes).await;

    let err = h
        .core
        .deliveries
        .create_delivery(&h.pengelola, delivery_request(order.order_id, cassettes[0]))
        .await
        .unwrap_err();
    assert!(matches!(err, CassetteError::InvalidTransition { .. }));
    assert_eq!(h.cassette_status(cassettes[0]).await, CassetteStatus::Bad);
}

#[tokio::test]
async fn test_receive_is_idempotent() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(1).await;
    let order = h.received_order(&cassettes).await;
    let first = h
        .core
        .deliveries
        .get_delivery(&h.staff, order.order_id)
        .await
        .unwrap();
    let transitions = h
        .core
        .orders
        .order_history(&h.staff, order.order_id)
        .await
        .unwrap()
        .len();

    let again = h
        .core
        .deliveries
        .receive_delivery(&h.staff, order.order_id, Some("second scan".to_string()))
        .await
        .unwrap();
    assert_eq!(again, first);
    assert_eq!(
        h.core
            .orders
            .order_history(&h.staff, order.order_id)
            .await
            .unwrap()
            .len(),
        transitions
    );
    assert_eq!(h.cassette_status(cassettes[0]).await, CassetteStatus::InRepair);
}

#[tokio::test]
async fn test_pickup_requires_signature() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(1).await;
    let order = h.received_order(&cassettes).await;
    h.core
        .repairs
        .create_bulk_from_order(&h.staff, order.order_id)
        .await
        .unwrap();
    h.repair_all(order.order_id, true).await;

    let unsigned = PickupConfirmation {
        recipient_name: Some("Budi Santoso".to_string()),
        recipient_signature: None,
        notes: None,
    };
    let err = h
        .core
        .deliveries
        .create_return(&h.staff, order.order_id, unsigned)
        .await
        .unwrap_err();
    assert!(matches!(err, CassetteError::Validation(_)));
    assert_eq!(h.order(order.order_id).await.status, OrderStatus::Resolved);
    assert_eq!(
        h.cassette_status(cassettes[0]).await,
        CassetteStatus::ReadyForPickup
    );
}

#[tokio::test]
async fn test_mixed_return_and_no_second_return() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(2).await;
    let order = h.received_order(&cassettes).await;
    let tickets = h
        .core
        .repairs
        .create_bulk_from_order(&h.staff, order.order_id)
        .await
        .unwrap();

    for (ticket, passed) in tickets.iter().zip([true, false]) {
        h.core.repairs.take(&h.staff, ticket.repair_id, None).await.unwrap();
        h.core.repairs.start(&h.staff, ticket.repair_id).await.unwrap();
        h.core
            .repairs
            .complete(&h.staff, ticket.repair_id, completion(passed))
            .await
            .unwrap();
    }

    let record = h
        .core
        .deliveries
        .create_return(&h.staff, order.order_id, signed_pickup())
        .await
        .unwrap();
    let pickups = record
        .items
        .iter()
        .filter(|i| i.kind == ReturnKind::Pickup)
        .count();
    let disposals = record
        .items
        .iter()
        .filter(|i| i.kind == ReturnKind::Disposal)
        .count();
    assert_eq!((pickups, disposals), (1, 1));

    assert_eq!(
        h.core
            .deliveries
            .get_return(&h.staff, order.order_id)
            .await
            .unwrap()
            .return_id,
        record.return_id
    );

    let err = h
        .core
        .deliveries
        .create_return(&h.staff, order.order_id, signed_pickup())
        .await
        .unwrap_err();
    assert!(matches!(err, CassetteError::PreconditionFailed(_)));
}

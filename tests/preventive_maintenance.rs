//! Preventive maintenance lifecycle, the simultaneous-PM guard and the
//! auto-scheduler.

mod common;

use chrono::NaiveDate;
use common::*;
use cassette_core::config::CoreConfig;
use cassette_core::error::CassetteError;
use cassette_core::models::{NewPreventiveMaintenance, PmDetailUpdate, PmUpdate};
use cassette_core::state_machine::states::{
    CassetteStatus, OrderStatus, PmDetailStatus, PmStatus, PmType, RepairLocation,
};
use uuid::Uuid;

fn pm_request(cassette_ids: Vec<Uuid>, pm_type: PmType) -> NewPreventiveMaintenance {
    NewPreventiveMaintenance {
        cassette_ids,
        scheduled_date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
        pm_type,
        engineer_id: None,
        location: Some("RC Surabaya".to_string()),
        notes: None,
        interval_days: Some(30),
        auto_schedule: true,
    }
}

fn completed(cassette_ids: &[Uuid]) -> PmUpdate {
    PmUpdate {
        details: cassette_ids
            .iter()
            .map(|id| PmDetailUpdate {
                cassette_id: *id,
                status: Some(PmDetailStatus::Completed),
                checklist: Some(serde_json::json!({"sensors": "ok", "rollers": "cleaned"})),
                findings: None,
            })
            .collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_simultaneous_pm_is_rejected() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(2).await;

    let first = h
        .core
        .preventive_maintenance
        .schedule(&h.staff, pm_request(vec![cassettes[0]], PmType::Routine))
        .await
        .unwrap();
    assert_eq!(first.status, PmStatus::Scheduled);
    assert_eq!(first.pm_number, "PM-20261102-000001");
    assert_eq!(h.cassette_status(cassettes[0]).await, CassetteStatus::Ok);

    let err = h
        .core
        .preventive_maintenance
        .schedule(&h.staff, pm_request(cassettes.clone(), PmType::OnDemand))
        .await
        .unwrap_err();
    assert!(matches!(err, CassetteError::Conflict(_)));
    assert!(err.to_string().contains("simultaneous PM"));

    // Once the first PM is terminal the cassette is free again
    h.core
        .preventive_maintenance
        .cancel(&h.staff, first.pm_id, Some("Engineer unavailable".to_string()))
        .await
        .unwrap();
    h.core
        .preventive_maintenance
        .schedule(&h.staff, pm_request(cassettes, PmType::OnDemand))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_taken_pm_still_reports_simultaneous_conflict() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(1).await;
    let pm = h
        .core
        .preventive_maintenance
        .schedule(&h.staff, pm_request(cassettes.clone(), PmType::Routine))
        .await
        .unwrap();
    h.core
        .preventive_maintenance
        .take(&h.staff, pm.pm_id, None)
        .await
        .unwrap();
    assert_eq!(h.cassette_status(cassettes[0]).await, CassetteStatus::InRepair);

    let err = h
        .core
        .preventive_maintenance
        .schedule(&h.staff, pm_request(cassettes, PmType::Emergency))
        .await
        .unwrap_err();
    assert!(matches!(err, CassetteError::Conflict(_)), "got {err:?}");
    assert!(err.to_string().contains("simultaneous PM"));
}

#[tokio::test]
async fn test_pm_lifecycle_moves_cassettes() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(2).await;
    let pm = h
        .core
        .preventive_maintenance
        .schedule(&h.staff, pm_request(cassettes.clone(), PmType::OnDemand))
        .await
        .unwrap();

    let rescheduled = h
        .core
        .preventive_maintenance
        .reschedule(&h.staff, pm.pm_id, NaiveDate::from_ymd_opt(2026, 11, 9).unwrap())
        .await
        .unwrap();
    assert_eq!(rescheduled.status, PmStatus::Rescheduled);

    // Progress cannot be reported before the PM starts
    let err = h
        .core
        .preventive_maintenance
        .update(&h.staff, pm.pm_id, completed(&cassettes))
        .await
        .unwrap_err();
    assert!(matches!(err, CassetteError::PreconditionFailed(_)));

    let taken = h
        .core
        .preventive_maintenance
        .take(&h.staff, pm.pm_id, None)
        .await
        .unwrap();
    assert_eq!(taken.status, PmStatus::InProgress);
    assert_eq!(taken.engineer_id, Some(h.staff.actor_id));
    for id in &cassettes {
        assert_eq!(h.cassette_status(*id).await, CassetteStatus::InRepair);
    }

    // A cassette in maintenance cannot be reported faulty
    let err = h
        .core
        .orders
        .open(&h.pengelola, new_order(h.pengelola.actor_id, RepairLocation::Rc, &cassettes[..1]))
        .await
        .unwrap_err();
    assert!(matches!(err, CassetteError::IllegalCassetteTransition { .. }));

    // Completion needs every detail done
    let err = h
        .core
        .preventive_maintenance
        .complete(&h.staff, pm.pm_id)
        .await
        .unwrap_err();
    assert!(matches!(err, CassetteError::PreconditionFailed(_)));

    h.core
        .preventive_maintenance
        .update(&h.staff, pm.pm_id, completed(&cassettes))
        .await
        .unwrap();
    let done = h
        .core
        .preventive_maintenance
        .complete(&h.staff, pm.pm_id)
        .await
        .unwrap();
    assert_eq!(done.status, PmStatus::Completed);
    for id in &cassettes {
        assert_eq!(h.cassette_status(*id).await, CassetteStatus::Ok);
    }

    // On-demand PMs do not repeat
    assert!(h.core.pm_queue.drain().await.is_empty());
}

#[tokio::test]
async fn test_update_rejects_foreign_cassette() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(1).await;
    let pm = h
        .core
        .preventive_maintenance
        .schedule(&h.staff, pm_request(cassettes, PmType::Routine))
        .await
        .unwrap();

    let update = PmUpdate {
        details: vec![PmDetailUpdate {
            cassette_id: Uuid::new_v4(),
            status: None,
            checklist: None,
            findings: Some("n/a".to_string()),
        }],
        ..Default::default()
    };
    let err = h
        .core
        .preventive_maintenance
        .update(&h.staff, pm.pm_id, update)
        .await
        .unwrap_err();
    assert!(matches!(err, CassetteError::Validation(_)));
}

#[tokio::test]
async fn test_cancel_started_pm_reverts_cassettes() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(1).await;
    let pm = h
        .core
        .preventive_maintenance
        .schedule(&h.staff, pm_request(cassettes.clone(), PmType::Emergency))
        .await
        .unwrap();
    h.core
        .preventive_maintenance
        .take(&h.staff, pm.pm_id, None)
        .await
        .unwrap();

    let cancelled = h
        .core
        .preventive_maintenance
        .cancel(&h.staff, pm.pm_id, None)
        .await
        .unwrap();
    assert_eq!(cancelled.status, PmStatus::Cancelled);
    assert_eq!(h.cassette_status(cassettes[0]).await, CassetteStatus::Ok);

    let err = h
        .core
        .preventive_maintenance
        .cancel(&h.staff, pm.pm_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CassetteError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_delete_cancels_and_hides_pm() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(1).await;
    let pm = h
        .core
        .preventive_maintenance
        .schedule(&h.staff, pm_request(cassettes.clone(), PmType::Routine))
        .await
        .unwrap();
    h.core
        .preventive_maintenance
        .take(&h.staff, pm.pm_id, None)
        .await
        .unwrap();

    let deleted = h
        .core
        .preventive_maintenance
        .delete(&h.admin, pm.pm_id, Some("Duplicate entry".to_string()))
        .await
        .unwrap();
    assert!(deleted.deleted_at.is_some());
    assert_eq!(deleted.status, PmStatus::Cancelled);
    assert_eq!(h.cassette_status(cassettes[0]).await, CassetteStatus::Ok);

    assert!(matches!(
        h.core.preventive_maintenance.get_pm(&h.staff, pm.pm_id).await,
        Err(CassetteError::NotFound { .. })
    ));
    h.core
        .preventive_maintenance
        .schedule(&h.staff, pm_request(cassettes, PmType::Routine))
        .await
        .unwrap();
}

async fn complete_routine_pm(h: &TestHarness, cassettes: &[Uuid]) -> Uuid {
    let pm = h
        .core
        .preventive_maintenance
        .schedule(&h.staff, pm_request(cassettes.to_vec(), PmType::Routine))
        .await
        .unwrap();
    h.core
        .preventive_maintenance
        .take(&h.staff, pm.pm_id, None)
        .await
        .unwrap();
    h.core
        .preventive_maintenance
        .update(&h.staff, pm.pm_id, completed(cassettes))
        .await
        .unwrap();
    h.core
        .preventive_maintenance
        .complete(&h.staff, pm.pm_id)
        .await
        .unwrap();
    pm.pm_id
}

#[tokio::test]
async fn test_auto_scheduler_books_next_routine_occurrence() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(1).await;
    complete_routine_pm(&h, &cassettes).await;

    let cycle = h.core.auto_scheduler().run_cycle().await;
    assert_eq!(cycle.scheduled, 1);
    assert_eq!(cycle.dropped, 0);
    assert_eq!(cycle.deferred, 0);

    // The new occurrence is active, so a manual PM now conflicts
    let err = h
        .core
        .preventive_maintenance
        .schedule(&h.staff, pm_request(cassettes, PmType::OnDemand))
        .await
        .unwrap_err();
    assert!(matches!(err, CassetteError::Conflict(_)));
}

#[tokio::test]
async fn test_auto_scheduler_drops_conflicting_occurrence() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(1).await;
    complete_routine_pm(&h, &cassettes).await;

    // Someone books the cassette before the scheduler ticks
    h.core
        .preventive_maintenance
        .schedule(&h.staff, pm_request(cassettes, PmType::OnDemand))
        .await
        .unwrap();

    let cycle = h.core.auto_scheduler().run_cycle().await;
    assert_eq!(cycle.scheduled, 0);
    assert_eq!(cycle.dropped, 1);
    assert!(h.core.pm_queue.drain().await.is_empty());
}

#[tokio::test]
async fn test_auto_scheduler_defers_while_cassette_is_busy() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(1).await;
    complete_routine_pm(&h, &cassettes).await;

    // The cassette is reported faulty before the scheduler ticks
    let order = h.open_order(RepairLocation::Rc, &cassettes).await;
    assert_eq!(h.cassette_status(cassettes[0]).await, CassetteStatus::Bad);

    let scheduler = h.core.auto_scheduler();
    let cycle = scheduler.run_cycle().await;
    assert_eq!(cycle.scheduled, 0);
    assert_eq!(cycle.dropped, 0);
    assert_eq!(cycle.deferred, 1);

    // Once the cassette is back in service the series continues
    h.core
        .orders
        .cancel(&h.pengelola, order.order_id, "Reported by mistake")
        .await
        .unwrap();
    let cycle = scheduler.run_cycle().await;
    assert_eq!(cycle.scheduled, 1);
    assert_eq!(cycle.deferred, 0);
    assert!(h.core.pm_queue.drain().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_schedule_racing_receive_leaves_one_winner() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(1).await;
    let order = h.open_order(RepairLocation::Rc, &cassettes).await;

    let receive = {
        let core = h.core.clone();
        let staff = h.staff.clone();
        tokio::spawn(async move {
            core.deliveries
                .receive_delivery(&staff, order.order_id, None)
                .await
        })
    };
    let schedule = {
        let core = h.core.clone();
        let staff = h.staff.clone();
        let request = pm_request(cassettes.clone(), PmType::OnDemand);
        tokio::spawn(async move { core.preventive_maintenance.schedule(&staff, request).await })
    };
    let (received, scheduled) = tokio::join!(receive, schedule);
    let received = received.unwrap();
    let scheduled = scheduled.unwrap();

    assert!(received.is_ok());
    assert!(matches!(
        scheduled,
        Err(CassetteError::IllegalCassetteTransition { .. })
    ));
    assert_eq!(h.cassette_status(cassettes[0]).await, CassetteStatus::InRepair);
    assert_eq!(h.order(order.order_id).await.status, OrderStatus::Received);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pm_take_racing_fault_report_leaves_one_winner() {
    for _ in 0..20 {
        let h = TestHarness::new();
        let cassettes = h.seed_cassettes(1).await;
        let pm = h
            .core
            .preventive_maintenance
            .schedule(&h.staff, pm_request(cassettes.clone(), PmType::OnDemand))
            .await
            .unwrap();

        let take = {
            let core = h.core.clone();
            let staff = h.staff.clone();
            tokio::spawn(async move { core.preventive_maintenance.take(&staff, pm.pm_id, None).await })
        };
        let report = {
            let core = h.core.clone();
            let pengelola = h.pengelola.clone();
            let request = new_order(pengelola.actor_id, RepairLocation::Rc, &cassettes);
            tokio::spawn(async move { core.orders.open(&pengelola, request).await })
        };
        let (taken, reported) = tokio::join!(take, report);
        let taken = taken.unwrap();
        let reported = reported.unwrap();

        assert!(taken.is_ok() ^ reported.is_ok());
        let expected = if taken.is_ok() {
            assert!(matches!(
                reported,
                Err(CassetteError::IllegalCassetteTransition { .. })
            ));
            CassetteStatus::InRepair
        } else {
            assert!(matches!(
                taken,
                Err(CassetteError::IllegalCassetteTransition { .. })
            ));
            CassetteStatus::Bad
        };
        assert_eq!(h.cassette_status(cassettes[0]).await, expected);
    }
}

#[tokio::test]
async fn test_disabled_auto_schedule_enqueues_nothing() {
    let h = TestHarness::new();
    let cassettes = h.seed_cassettes(1).await;
    let pm = h
        .core
        .preventive_maintenance
        .schedule(&h.staff, pm_request(cassettes.clone(), PmType::Routine))
        .await
        .unwrap();

    let disabled = h
        .core
        .preventive_maintenance
        .disable_auto_schedule(&h.staff, pm.pm_id)
        .await
        .unwrap();
    assert!(!disabled.auto_schedule);

    h.core
        .preventive_maintenance
        .take(&h.staff, pm.pm_id, None)
        .await
        .unwrap();
    h.core
        .preventive_maintenance
        .update(&h.staff, pm.pm_id, completed(&cassettes))
        .await
        .unwrap();
    h.core
        .preventive_maintenance
        .complete(&h.staff, pm.pm_id)
        .await
        .unwrap();

    assert_eq!(h.core.auto_scheduler().run_cycle().await.scheduled, 0);
}

#[tokio::test]
async fn test_global_switch_disables_auto_scheduling() {
    let mut config = CoreConfig::for_tests();
    config.preventive_maintenance.auto_schedule_enabled = false;
    let h = TestHarness::with_config(config);
    let cassettes = h.seed_cassettes(1).await;

    complete_routine_pm(&h, &cassettes).await;
    assert!(h.core.pm_queue.drain().await.is_empty());
}

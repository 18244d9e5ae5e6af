use proptest::prelude::*;

use cassette_core::state_machine::events::{CassetteEvent, OrderEvent};
use cassette_core::state_machine::states::CassetteStatus;

const CASSETTE_EVENTS: &[CassetteEvent] = &[
    CassetteEvent::ReportFault,
    CassetteEvent::Ship,
    CassetteEvent::ReceiveAtRc,
    CassetteEvent::StartOnSiteRepair,
    CassetteEvent::QcPassed,
    CassetteEvent::QcFailed,
    CassetteEvent::RetireForReplacement,
    CassetteEvent::StageReplacement,
    CassetteEvent::PickedUp,
    CassetteEvent::Disposed,
    CassetteEvent::CancelOrder,
    CassetteEvent::SchedulePm,
    CassetteEvent::StartPm,
    CassetteEvent::FinishPm,
    CassetteEvent::CancelPm,
];

/// Strategy for any order event
pub fn order_event_strategy() -> impl Strategy<Value = OrderEvent> {
    prop::sample::select(OrderEvent::ALL.to_vec())
}

/// Strategy for sequences of order events, legal or not
pub fn order_event_sequence_strategy() -> impl Strategy<Value = Vec<OrderEvent>> {
    prop::collection::vec(order_event_strategy(), 0..40)
}

pub fn cassette_event_strategy() -> impl Strategy<Value = CassetteEvent> {
    prop::sample::select(CASSETTE_EVENTS.to_vec())
}

pub fn cassette_event_sequence_strategy() -> impl Strategy<Value = Vec<CassetteEvent>> {
    prop::collection::vec(cassette_event_strategy(), 0..60)
}

pub fn cassette_status_strategy() -> impl Strategy<Value = CassetteStatus> {
    prop::sample::select(CassetteStatus::ALL.to_vec())
}

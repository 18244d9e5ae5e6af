// State machine module for the cassette lifecycle
//
// Every entity gets an explicit adjacency table. Operations plan their writes
// as effects and hand them to a single transactional apply step.

pub mod cassette_state_machine;
pub mod effects;
pub mod events;
pub mod guards;
pub mod order_state_machine;
pub mod pm_state_machine;
pub mod repair_state_machine;
pub mod states;

// Re-export main types for convenient access
pub use cassette_state_machine::{CassetteStateTracker, CASSETTE_TRANSITIONS};
pub use effects::{apply_effects, Effect, EffectPlan};
pub use events::{CassetteEvent, OrderEvent, PmEvent, RepairEvent};
pub use order_state_machine::{OrderStateMachine, ORDER_TRANSITIONS};
pub use pm_state_machine::{PmStateMachine, PM_TRANSITIONS};
pub use repair_state_machine::{RepairStateMachine, REPAIR_TRANSITIONS};
pub use states::{
    CassetteStatus, OrderPriority, OrderStatus, PmDetailStatus, PmStatus, PmType, QcOutcome,
    RepairLocation, RepairStatus,
};

pub use guards::StateGuard;

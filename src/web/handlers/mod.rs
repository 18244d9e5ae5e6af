//! HTTP handlers, one module per resource.

pub mod health;
pub mod preventive_maintenance;
pub mod repairs;
pub mod tickets;

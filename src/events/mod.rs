//! # Domain Events
//!
//! Committed lifecycle changes are broadcast as [`DomainEvent`]s. The core
//! only publishes; delivering notifications is left to subscribers.

pub mod publisher;

pub use publisher::{DomainEvent, EventPublisher};

#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Cassette Core
//!
//! Lifecycle orchestration for ATM/CRM currency cassettes moving between
//! bank branches, third-party operators (pengelola) and a repair center.
//!
//! ## Overview
//!
//! Two workflows share one physical asset. A **Service Order** carries
//! faulty cassettes through delivery, repair (or replacement) and return; a
//! **Preventive Maintenance** task takes healthy cassettes out of service for
//! scheduled inspection. The core keeps every cassette's status consistent
//! with both and refuses operations that would double-book a cassette.
//!
//! ## Module Organization
//!
//! - [`state_machine`] - Order, repair, PM and cassette tables, guards and effect plans
//! - [`orchestration`] - The six lifecycle components and the PM auto-scheduler
//! - [`database`] - Storage contract with PostgreSQL and in-memory backends
//! - [`models`] - Persisted entities and request payloads
//! - [`services`] - Audit, permission and PM scheduler collaborators
//! - [`events`] - Domain event broadcast
//! - [`web`] - axum HTTP API
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cassette_core::config::CoreConfig;
//! use cassette_core::database::InMemoryStore;
//! use cassette_core::orchestration::OrchestrationCore;
//!
//! let core = OrchestrationCore::new(Arc::new(InMemoryStore::new()), CoreConfig::default());
//! let app = cassette_core::web::create_app(Arc::new(core));
//! # let _ = app;
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod services;
pub mod state_machine;
pub mod web;

pub use config::CoreConfig;
pub use error::{CassetteError, Result};
pub use orchestration::OrchestrationCore;

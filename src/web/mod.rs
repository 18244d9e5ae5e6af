//! # Web API
//!
//! axum HTTP surface over the [`OrchestrationCore`]. Handlers only extract
//! the caller and payload and call one core operation; every rule lives in
//! the orchestration components.

pub mod errors;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::orchestration::OrchestrationCore;
use handlers::{health, preventive_maintenance as pm, repairs, tickets};

pub use errors::{ApiError, ApiResult};
pub use state::AppState;

/// Build the router with every route and the middleware stack
pub fn create_app(core: Arc<OrchestrationCore>) -> Router {
    let config = core.config().clone();
    let router = Router::new()
        .route("/health", get(health::health_check))
        .merge(ticket_routes())
        .merge(repair_routes())
        .merge(pm_routes())
        .with_state(AppState::new(core));

    middleware::apply_middleware_stack(router, &config)
}

fn ticket_routes() -> Router<AppState> {
    Router::new()
        .route("/tickets", post(tickets::open_ticket))
        .route("/tickets/delivery", post(tickets::create_delivery))
        .route("/tickets/return", post(tickets::create_return))
        .route(
            "/tickets/:id",
            get(tickets::get_ticket).delete(tickets::cancel_ticket),
        )
        .route("/tickets/:id/history", get(tickets::ticket_history))
        .route("/tickets/:id/repairs", get(tickets::ticket_repairs))
        .route("/tickets/:id/delivery", get(tickets::get_delivery))
        .route("/tickets/:id/return", get(tickets::get_return))
        .route("/tickets/:id/advance", post(tickets::advance_ticket))
        .route("/tickets/:id/reconcile", post(tickets::reconcile_ticket))
        .route("/tickets/:id/request-on-site", post(tickets::request_on_site))
        .route("/tickets/:id/approve-on-site", post(tickets::approve_on_site))
        .route("/tickets/:id/reject-on-site", post(tickets::reject_on_site))
        .route("/tickets/:id/replacement", post(tickets::create_replacement))
        .route(
            "/tickets/:id/receive-delivery",
            post(tickets::receive_delivery),
        )
        .route("/cassettes/:id", get(tickets::get_cassette))
}

fn repair_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/repairs/bulk-from-ticket/:id",
            post(repairs::create_bulk_from_ticket),
        )
        .route("/repairs/:id", get(repairs::get_repair))
        .route("/repairs/:id/take", post(repairs::take_repair))
        .route("/repairs/:id/start", post(repairs::start_repair))
        .route("/repairs/:id/complete", post(repairs::complete_repair))
}

fn pm_routes() -> Router<AppState> {
    Router::new()
        .route("/preventive-maintenance", post(pm::schedule_pm))
        .route(
            "/preventive-maintenance/:id",
            get(pm::get_pm).patch(pm::update_pm).delete(pm::delete_pm),
        )
        .route("/preventive-maintenance/:id/take", post(pm::take_pm))
        .route(
            "/preventive-maintenance/:id/reschedule",
            post(pm::reschedule_pm),
        )
        .route("/preventive-maintenance/:id/complete", post(pm::complete_pm))
        .route("/preventive-maintenance/:id/cancel", post(pm::cancel_pm))
        .route(
            "/preventive-maintenance/:id/disable-auto-schedule",
            post(pm::disable_auto_schedule),
        )
}

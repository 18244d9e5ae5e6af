//! Middleware stack for the web API.

use axum::Router;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::CoreConfig;

/// Apply the standard middleware stack to a router
pub fn apply_middleware_stack(router: Router, config: &CoreConfig) -> Router {
    router
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

//! # Structured Logging Module
//!
//! Environment-aware structured logging for the lifecycle core, plus helpers
//! that give every order, cassette and PM log record the same field names.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

use crate::config::LogFormat;
use crate::error::CassetteError;
use crate::state_machine::events::CassetteEvent;
use crate::state_machine::states::CassetteStatus;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber,
/// and an already-installed global subscriber is left in place.
pub fn init_structured_logging(format: LogFormat) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = std::env::var("RUST_LOG")
            .map(EnvFilter::new)
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let layer = match format {
            LogFormat::Json => fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed(),
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            format = ?format,
            "Structured logging initialized"
        );
    });
}

fn get_environment() -> String {
    std::env::var("CASSETTE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for service order operations
pub fn log_order_operation(
    operation: &str,
    order_id: Option<Uuid>,
    ticket_number: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        order_id = ?order_id,
        ticket_number = ticket_number,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "ORDER_OPERATION"
    );
}

/// Log a committed cassette status change
pub fn log_cassette_transition(
    cassette_id: Uuid,
    from: CassetteStatus,
    to: CassetteStatus,
    event: CassetteEvent,
) {
    tracing::info!(
        cassette_id = %cassette_id,
        from = %from,
        to = %to,
        event = %event,
        "CASSETTE_TRANSITION"
    );
}

/// Log structured data for preventive maintenance operations
pub fn log_pm_operation(
    operation: &str,
    pm_id: Option<Uuid>,
    pm_number: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        pm_id = ?pm_id,
        pm_number = pm_number,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "PM_OPERATION"
    );
}

/// Log a rejected or failed operation; client errors at `warn`, the rest at `error`
pub fn log_error(operation: &str, error: &CassetteError) {
    if error.is_client_error() {
        tracing::warn!(
            operation = %operation,
            error_kind = error.kind(),
            error = %error,
            "OPERATION_REJECTED"
        );
    } else {
        tracing::error!(
            operation = %operation,
            error_kind = error.kind(),
            error = %error,
            timestamp = %Utc::now().to_rfc3339(),
            "OPERATION_FAILED"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels() {
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging(LogFormat::Pretty);
        init_structured_logging(LogFormat::Json);
        log_error("noop", &CassetteError::conflict("duplicate"));
    }
}

//! Cassette lifecycle server.
//!
//! Loads layered configuration, connects the configured store, starts the PM
//! auto-scheduler and serves the HTTP API until Ctrl-C or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use cassette_core::config::ConfigManager;
use cassette_core::logging::init_structured_logging;
use cassette_core::orchestration::OrchestrationCore;
use cassette_core::web::create_app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let manager = ConfigManager::load().context("failed to load configuration")?;
    let config = manager.config().clone();
    init_structured_logging(config.logging.format);

    info!(
        environment = manager.environment(),
        backend = ?config.storage.backend,
        bind_address = %config.web.bind_address,
        "Starting cassette server"
    );

    let core = Arc::new(
        OrchestrationCore::from_config(config.clone())
            .await
            .context("failed to initialize orchestration core")?,
    );

    let scheduler = if config.preventive_maintenance.auto_schedule_enabled {
        let scheduler = core.auto_scheduler();
        let shutdown = scheduler.shutdown_handle();
        Some((scheduler.spawn(), shutdown))
    } else {
        info!("PM auto-scheduler disabled");
        None
    };

    let listener = TcpListener::bind(&config.web.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.web.bind_address))?;
    info!(address = %config.web.bind_address, "HTTP server listening");

    axum::serve(listener, create_app(core))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    if let Some((handle, shutdown)) = scheduler {
        shutdown.notify_one();
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "PM auto-scheduler task ended abnormally");
        }
    }

    info!("Cassette server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

//! order-service entry point.
//!
//! Loads configuration, sets up tracing and builds the [`OrderSystem`], then serves
//! HTTP until a termination signal and runs the ordered shutdown.

use anyhow::Context;
use order_runtime::{setup_tracing, CloseOutcome};
use order_service::config::ServiceConfig;
use order_service::lifecycle::OrderSystem;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Before tracing, so RUST_LOG from .env applies.
    let config = ServiceConfig::from_env().context("invalid configuration")?;
    setup_tracing();
    info!(?config, "Starting order service");

    let mut system = OrderSystem::from_config(&config)
        .await
        .context("failed to open order store")?;

    let rescheduled = system
        .engine
        .reconcile_pending()
        .await
        .context("failed to reconcile pending orders")?;
    if rescheduled > 0 {
        info!(rescheduled, "Resumed fulfillment of pending orders");
    }

    let addr = system
        .serve(config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;
    info!("order-service listening on http://{}", addr);

    shutdown_signal().await;

    let report = system
        .shutdown(config.shutdown_timeout)
        .await
        .context("invalid shutdown manifest")?;
    for (name, outcome) in &report.outcomes {
        match outcome {
            CloseOutcome::ClosedOk => info!(%name, "closed"),
            CloseOutcome::ClosedWithError(e) => error!(%name, error = %e, "close failed"),
            CloseOutcome::TimedOut => warn!(%name, "close timed out"),
        }
    }
    info!(
        elapsed_ms = report.elapsed.as_millis() as u64,
        clean = report.is_clean(),
        "order-service stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

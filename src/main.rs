//! Seatgate server.
//!
//! Wires configuration, storage, admission and services together, repairs
//! capacity drift, then runs the expiry sweep and drift checks until a
//! shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use seatgate_core::config::{AppConfig, LogFormat};
use seatgate_core::error::AppError;
use seatgate_service::ServiceState;
use seatgate_worker::{CronScheduler, ExpiryReconciler, SweepRunner};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Load configuration from file, environment overlay and variables
fn load_configuration() -> Result<AppConfig, AppError> {
    let config_path =
        std::env::var("SEATGATE_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
    let env = std::env::var("SEATGATE_ENV").unwrap_or_else(|_| "development".to_string());

    AppConfig::load(&config_path, &env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.directive()));

    match config.logging.format {
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        LogFormat::Pretty => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    info!("Starting Seatgate v{}", env!("CARGO_PKG_VERSION"));
    let reconciler_config = config.reconciler.clone();

    // ── Step 1: Storage, coordination, backend, services ─────────
    let state = ServiceState::build(config).await?;

    // ── Step 2: Repair drift before taking traffic ───────────────
    let repaired = state.capacity.startup_recovery().await?;
    info!(
        sections = repaired.len(),
        repaired = repaired.iter().filter(|r| r.repaired()).count(),
        "Capacity state ready"
    );

    // ── Step 3: Shutdown channel ─────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Step 4: Expiry sweep and drift checks ────────────────────
    let (runner_handle, mut scheduler) = if reconciler_config.enabled {
        let sweeper = Arc::new(ExpiryReconciler::new(
            state.reservations.clone(),
            Arc::clone(&state.store),
            Arc::clone(&state.backend),
        ));
        let runner = SweepRunner::new(sweeper, &reconciler_config);
        let cancel = shutdown_rx.clone();
        let handle = tokio::spawn(async move {
            runner.run(cancel).await;
        });

        let scheduler = CronScheduler::new(Arc::clone(&state.capacity)).await?;
        scheduler
            .register_drift_check(&reconciler_config.drift_check_cron)
            .await?;
        scheduler.start().await?;

        (Some(handle), Some(scheduler))
    } else {
        warn!("Reconciler disabled: overdue holds will not be expired");
        (None, None)
    };

    info!("Seatgate ready");

    // ── Step 5: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    info!("Shutdown signal received, finishing current sweep...");
    let _ = shutdown_tx.send(true);

    if let Some(handle) = runner_handle {
        if tokio::time::timeout(Duration::from_secs(30), handle).await.is_err() {
            warn!("Expiry sweep did not finish within 30s");
        }
    }
    if let Some(scheduler) = scheduler.as_mut() {
        if let Err(e) = scheduler.shutdown().await {
            warn!(error = %e, "Scheduler shutdown failed");
        }
    }

    state.database.close().await;
    info!("Seatgate stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
}

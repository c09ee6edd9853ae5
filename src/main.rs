//! Rewind Server: rental lifecycle and streaming access engine.
//!
//! Main entry point that wires the crates together, recovers access state,
//! and runs the periodic sweeps until shutdown.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing;
use tracing_subscriber::{EnvFilter, fmt};

use rewind_core::config::AppConfig;
use rewind_core::error::AppError;
use rewind_core::events::{DomainEvent, EventPayload, RentalEvent};
use rewind_database::DatabasePool;
use rewind_database::repositories::{PgCatalog, PgCreditLedger, PgRentalStore};
use rewind_service::{EventBus, RentalService};
use rewind_storage::ProvisionerDispatch;
use rewind_worker::CronScheduler;

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
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    match std::env::var("REWIND_CONFIG") {
        Ok(path) => AppConfig::load_file(&path),
        Err(_) => {
            let env = std::env::var("REWIND_ENV").unwrap_or_else(|_| "development".to_string());
            AppConfig::load(&env)
        }
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
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
    tracing::info!("Starting Rewind v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Database connection + migrations ─────────────────
    tracing::info!("Connecting to database...");
    let db = DatabasePool::connect(&config.database).await?;

    tracing::info!("Running database migrations...");
    rewind_database::migration::run_migrations(db.pool()).await?;
    tracing::info!("Database migrations complete");

    // ── Step 2: Access point provisioner ─────────────────────────
    tracing::info!(provider = %config.access.provider, "Initializing access provisioner...");
    let provisioner = ProvisionerDispatch::from_config(&config.access).await?;
    if !rewind_core::traits::AccessProvisioner::health_check(&provisioner).await? {
        return Err(AppError::service_unavailable(
            "Access provisioner failed its health check",
        ));
    }

    // ── Step 3: Rental engine ────────────────────────────────────
    let pool = db.pool().clone();
    let events = EventBus::default();
    let service = RentalService::new(
        Arc::new(PgRentalStore::new(pool.clone())),
        Arc::new(PgCreditLedger::new(pool.clone())),
        Arc::new(PgCatalog::new(pool)),
        Arc::new(provisioner),
        config.rental.clone(),
        events.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let event_log = tokio::spawn(log_events(events.subscribe(), shutdown_rx));

    // ── Step 4: Startup access recovery ──────────────────────────
    if config.worker.startup_recovery {
        let report = service.recovery().reconcile().await?;
        tracing::info!(
            live = report.live,
            orphaned = report.orphaned,
            revoked = report.revoked,
            pending = report.pending,
            failed = report.failed,
            "Startup access recovery complete"
        );
    }

    // ── Step 5: Scheduled sweeps ─────────────────────────────────
    let mut scheduler = if config.worker.enabled {
        let scheduler = CronScheduler::new().await?;
        scheduler
            .register_rental_tasks(
                &config.worker,
                service.expiry().clone(),
                service.recovery().clone(),
            )
            .await?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        tracing::info!("Scheduled sweeps disabled");
        None
    };

    tracing::info!("Rewind is running");

    // ── Step 6: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");

    if let Some(scheduler) = scheduler.as_mut() {
        scheduler.shutdown().await?;
    }
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), event_log).await;
    db.close().await;

    tracing::info!("Rewind shut down gracefully");
    Ok(())
}

/// Operator-facing log of rental events
async fn log_events(
    mut events: broadcast::Receiver<DomainEvent>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            received = events.recv() => match received {
                Ok(event) => {
                    let EventPayload::Rental(rental_event) = event.payload;
                    match rental_event {
                        RentalEvent::ReturnRequested { rental_id, film_id, user_id } => {
                            tracing::warn!(
                                %rental_id,
                                %film_id,
                                %user_id,
                                "Holder requested early return, collect the copy"
                            );
                        }
                        other => {
                            tracing::debug!(event_id = %event.id, rental_id = %other.rental_id(), "Rental event");
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Event log fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

//! Cron scheduler for the periodic rental sweeps.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing;

use rewind_core::config::WorkerConfig;
use rewind_core::error::AppError;
use rewind_core::result::AppResult;
use rewind_service::{AccessRecovery, ExpiryReconciler};

use crate::jobs::{AccessAuditJob, ExpirySweepJob, PeriodicJob};

/// Cron-based scheduler for periodic background tasks.
///
/// Each registered job gets its own gate, so a pass that outlives its
/// interval makes the next tick skip instead of running concurrently.
pub struct CronScheduler {
    /// The underlying job scheduler
    scheduler: JobScheduler,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler").finish()
    }
}

impl CronScheduler {
    /// Create a new cron scheduler
    pub async fn new() -> AppResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;

        Ok(Self { scheduler })
    }

    /// Register the expiry sweep and access audit on their configured schedules
    pub async fn register_rental_tasks(
        &self,
        config: &WorkerConfig,
        expiry: ExpiryReconciler,
        recovery: AccessRecovery,
    ) -> AppResult<()> {
        self.register(
            &config.expiry_sweep_cron,
            Arc::new(ExpirySweepJob::new(expiry)),
        )
        .await?;
        self.register(
            &config.access_audit_cron,
            Arc::new(AccessAuditJob::new(recovery)),
        )
        .await?;

        tracing::info!("All scheduled tasks registered");
        Ok(())
    }

    /// Register one job on a six-field cron expression
    pub async fn register(&self, cron: &str, job: Arc<dyn PeriodicJob>) -> AppResult<()> {
        let name = job.name();
        let gate = Arc::new(Mutex::new(()));
        let cron_job = CronJob::new_async(cron, move |_uuid, _lock| {
            let job = Arc::clone(&job);
            let gate = Arc::clone(&gate);
            Box::pin(async move {
                tracing::trace!(task = job.name(), "Scheduled tick");
                match run_exclusive(job.as_ref(), &gate).await {
                    Some(Ok(summary)) => tracing::debug!(summary = %summary, "Scheduled task finished"),
                    Some(Err(e)) => tracing::error!(task = job.name(), error = %e, "Scheduled task failed"),
                    None => tracing::warn!(task = job.name(), "Previous run still in progress, skipping tick"),
                }
            })
        })
        .map_err(|e| {
            AppError::configuration(format!("Invalid schedule '{cron}' for {name}: {e}"))
        })?;

        self.scheduler
            .add(cron_job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add {name} schedule: {e}")))?;

        tracing::info!(task = name, cron = cron, "Registered scheduled task");
        Ok(())
    }

    /// Start the scheduler
    pub async fn start(&self) -> AppResult<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;

        tracing::info!("Cron scheduler started");
        Ok(())
    }

    /// Shutdown the scheduler
    pub async fn shutdown(&mut self) -> AppResult<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {e}")))?;

        tracing::info!("Cron scheduler shut down");
        Ok(())
    }
}

/// Run `job` unless another pass holding `gate` is still going.
///
/// Returns `None` when the tick was skipped.
pub async fn run_exclusive(job: &dyn PeriodicJob, gate: &Mutex<()>) -> Option<AppResult<Value>> {
    let _held = gate.try_lock().ok()?;
    Some(job.run().await)
}

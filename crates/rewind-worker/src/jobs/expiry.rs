//! Expiry sweep job.

use async_trait::async_trait;
use serde_json::Value;

use rewind_core::result::AppResult;
use rewind_service::ExpiryReconciler;

use super::PeriodicJob;

/// Retires every active rental whose access period has ended.
#[derive(Debug, Clone)]
pub struct ExpirySweepJob {
    reconciler: ExpiryReconciler,
}

impl ExpirySweepJob {
    /// Wrap a reconciler.
    pub fn new(reconciler: ExpiryReconciler) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl PeriodicJob for ExpirySweepJob {
    fn name(&self) -> &'static str {
        "expiry_sweep"
    }

    async fn run(&self) -> AppResult<Value> {
        let report = self.reconciler.sweep().await?;
        Ok(serde_json::json!({
            "task": self.name(),
            "examined": report.examined,
            "expired": report.expired,
            "failed": report.failed,
        }))
    }
}

//! Orphaned access point audit job.

use async_trait::async_trait;
use serde_json::Value;

use rewind_core::result::AppResult;
use rewind_service::AccessRecovery;

use super::PeriodicJob;

/// Revokes access points that no active rental accounts for.
///
/// Uses [`AccessRecovery::audit`], which only revokes a token once it is
/// older than the orphan grace window and was already orphaned on the
/// previous run.
#[derive(Debug, Clone)]
pub struct AccessAuditJob {
    recovery: AccessRecovery,
}

impl AccessAuditJob {
    /// Wrap a recovery handle.
    pub fn new(recovery: AccessRecovery) -> Self {
        Self { recovery }
    }
}

#[async_trait]
impl PeriodicJob for AccessAuditJob {
    fn name(&self) -> &'static str {
        "access_audit"
    }

    async fn run(&self) -> AppResult<Value> {
        let report = self.recovery.audit().await?;
        Ok(serde_json::json!({
            "task": self.name(),
            "live": report.live,
            "orphaned": report.orphaned,
            "revoked": report.revoked,
            "pending": report.pending,
            "failed": report.failed,
        }))
    }
}

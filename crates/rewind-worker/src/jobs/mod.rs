//! Periodic job implementations.

pub mod audit;
pub mod expiry;

pub use audit::AccessAuditJob;
pub use expiry::ExpirySweepJob;

use async_trait::async_trait;
use serde_json::Value;

use rewind_core::result::AppResult;

/// A unit of periodic work the scheduler can drive.
///
/// `run` returns a small JSON summary that the scheduler logs.
#[async_trait]
pub trait PeriodicJob: Send + Sync + std::fmt::Debug + 'static {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// Run one pass.
    async fn run(&self) -> AppResult<Value>;
}

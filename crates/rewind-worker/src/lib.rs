//! Scheduled background tasks for Rewind.
//!
//! This crate provides:
//! - Periodic job implementations for the expiry sweep and the orphaned
//!   access point audit
//! - A cron scheduler that runs them as explicit process-level tasks

pub mod jobs;
pub mod scheduler;

pub use jobs::{AccessAuditJob, ExpirySweepJob, PeriodicJob};
pub use scheduler::CronScheduler;

//! Background worker configuration.

use serde::{Deserialize, Serialize};

/// Periodic sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the scheduler is started with the server.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Six-field cron expression for the expiry sweep.
    #[serde(default = "default_expiry_sweep_cron")]
    pub expiry_sweep_cron: String,
    /// Six-field cron expression for the orphaned access point audit.
    #[serde(default = "default_access_audit_cron")]
    pub access_audit_cron: String,
    /// Run the access point audit once before the scheduler starts.
    #[serde(default = "default_true")]
    pub startup_recovery: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expiry_sweep_cron: default_expiry_sweep_cron(),
            access_audit_cron: default_access_audit_cron(),
            startup_recovery: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_expiry_sweep_cron() -> String {
    "0 */5 * * * *".to_string()
}

fn default_access_audit_cron() -> String {
    "0 17 * * * *".to_string()
}

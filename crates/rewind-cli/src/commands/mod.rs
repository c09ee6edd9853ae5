//! CLI command definitions and dispatch.

pub mod migrate;
pub mod rental;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use rewind_core::config::AppConfig;
use rewind_core::error::AppError;
use rewind_database::DatabasePool;
use rewind_database::repositories::{PgCatalog, PgCreditLedger, PgRentalStore};
use rewind_service::{EventBus, RentalService};
use rewind_storage::ProvisionerDispatch;

/// Rewind: rental lifecycle and streaming access engine
#[derive(Debug, Parser)]
#[command(name = "rewind", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Rental inspection and operator actions
    Rental(rental::RentalArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Migrate(args) => migrate::execute(args, &self.config).await,
            Commands::Rental(args) => rental::execute(args, &self.config, self.format).await,
        }
    }
}

/// Helper: load configuration from file
pub fn load_config(config_path: &str) -> Result<AppConfig, AppError> {
    AppConfig::load_file(config_path)
}

/// Helper: connect to the database from config
pub async fn connect(config: &AppConfig) -> Result<DatabasePool, AppError> {
    DatabasePool::connect(&config.database).await
}

/// Helper: wire a rental service against PostgreSQL and the configured
/// access point provisioner
pub async fn build_service(config: &AppConfig, db: &DatabasePool) -> Result<RentalService, AppError> {
    let pool = db.pool().clone();
    let provisioner = ProvisionerDispatch::from_config(&config.access).await?;

    Ok(RentalService::new(
        Arc::new(PgRentalStore::new(pool.clone())),
        Arc::new(PgCreditLedger::new(pool.clone())),
        Arc::new(PgCatalog::new(pool)),
        Arc::new(provisioner),
        config.rental.clone(),
        EventBus::default(),
    ))
}

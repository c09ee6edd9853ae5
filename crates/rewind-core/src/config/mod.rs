//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod access;
pub mod database;
pub mod logging;
pub mod rental;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use self::access::{AccessConfig, ProvisionerKind};
pub use self::database::DatabaseConfig;
pub use self::logging::LoggingConfig;
pub use self::rental::{RentalConfig, TierTerms};
pub use self::worker::WorkerConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// Access point provisioning settings.
    #[serde(default)]
    pub access: AccessConfig,
    /// Rental pricing, durations, and reward settings.
    #[serde(default)]
    pub rental: RentalConfig,
    /// Background sweep settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `REWIND__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        Self::build(
            config::Config::builder()
                .add_source(config::File::with_name("config/default").required(false))
                .add_source(config::File::with_name(&format!("config/{env}")).required(false)),
        )
    }

    /// Load configuration from an explicit file, still honouring
    /// `REWIND__` environment overrides.
    pub fn load_file(path: &str) -> Result<Self, AppError> {
        Self::build(config::Config::builder().add_source(config::File::with_name(path)))
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, AppError> {
        let config = builder
            .add_source(
                config::Environment::with_prefix("REWIND")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field and range constraints serde cannot express.
    pub fn validate(&self) -> Result<(), AppError> {
        self.rental.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let raw = r#"
            [database]
            url = "postgres://rewind@localhost/rewind"
        "#;

        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .expect("minimal config should deserialize");

        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.access.provider, ProvisionerKind::Symlink);
        assert_eq!(config.rental.standard.cost, 1);
        assert_eq!(config.rental.standard.duration_hours, 72);
        assert_eq!(config.worker.expiry_sweep_cron, "0 */5 * * * *");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_tier_override() {
        let raw = r#"
            [database]
            url = "postgres://localhost/rewind"

            [rental.recent]
            cost = 3
            duration_hours = 24
        "#;

        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .expect("config should deserialize");

        assert_eq!(config.rental.recent.cost, 3);
        assert_eq!(config.rental.recent.duration_hours, 24);
        // untouched tiers keep defaults
        assert_eq!(config.rental.classic.duration_hours, 168);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_file_rejects_negative_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(
            &path,
            r#"
                [database]
                url = "postgres://localhost/rewind"

                [rental.classic]
                cost = 1
                duration_hours = -168
            "#,
        )
        .unwrap();

        let err = AppConfig::load_file(path.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Configuration);
        assert!(err.message.contains("rental.classic.duration_hours"));
    }
}

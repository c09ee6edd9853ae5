//! Provisioner selection from configuration.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use rewind_core::config::{AccessConfig, ProvisionerKind};
use rewind_core::result::AppResult;
use rewind_core::traits::{AccessPoint, AccessProvisioner, MediaAssets, StreamingUrl};
use rewind_core::types::AccessToken;

use crate::providers::MemoryProvisioner;
#[cfg(unix)]
use crate::providers::SymlinkProvisioner;

/// Dispatcher over the access point backends.
///
/// Switches between symlink directories and the in-memory table based on
/// `access.provider`.
#[derive(Debug, Clone)]
pub enum ProvisionerDispatch {
    /// One symlink directory per token.
    #[cfg(unix)]
    Symlink(SymlinkProvisioner),
    /// Process-local table.
    Memory(MemoryProvisioner),
}

impl ProvisionerDispatch {
    /// Build the configured backend.
    pub async fn from_config(config: &AccessConfig) -> AppResult<Self> {
        info!(
            provider = %config.provider,
            base_url = %config.public_base_url,
            "Initializing access provisioner"
        );
        match config.provider {
            #[cfg(unix)]
            ProvisionerKind::Symlink => Ok(Self::Symlink(
                SymlinkProvisioner::new(
                    PathBuf::from(&config.root_path),
                    PathBuf::from(&config.media_root),
                    config.public_base_url.clone(),
                )
                .await?,
            )),
            #[cfg(not(unix))]
            ProvisionerKind::Symlink => Err(rewind_core::AppError::configuration(
                "The symlink provider requires a Unix filesystem",
            )),
            ProvisionerKind::Memory => Ok(Self::Memory(MemoryProvisioner::new(
                PathBuf::from(&config.media_root),
                config.public_base_url.clone(),
            ))),
        }
    }

    fn inner(&self) -> &dyn AccessProvisioner {
        match self {
            #[cfg(unix)]
            Self::Symlink(p) => p,
            Self::Memory(p) => p,
        }
    }
}

#[async_trait]
impl AccessProvisioner for ProvisionerDispatch {
    fn provider_type(&self) -> &str {
        self.inner().provider_type()
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner().health_check().await
    }

    async fn grant(
        &self,
        token: &AccessToken,
        assets: &MediaAssets,
    ) -> AppResult<Vec<StreamingUrl>> {
        self.inner().grant(token, assets).await
    }

    async fn revoke(&self, token: &AccessToken) -> AppResult<()> {
        self.inner().revoke(token).await
    }

    async fn resolve(&self, token: &str, asset_name: &str) -> AppResult<std::path::PathBuf> {
        self.inner().resolve(token, asset_name).await
    }

    async fn tokens(&self) -> AppResult<Vec<AccessToken>> {
        self.inner().tokens().await
    }

    async fn inspect(&self, token: &AccessToken) -> AppResult<Option<AccessPoint>> {
        self.inner().inspect(token).await
    }
}

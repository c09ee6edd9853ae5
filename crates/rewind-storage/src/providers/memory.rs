//! In-memory access point table (single node).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use rewind_core::error::AppError;
use rewind_core::result::AppResult;
use rewind_core::traits::{
    AccessPoint, AccessProvisioner, AssetKind, MediaAssets, StreamingUrl,
};
use rewind_core::types::AccessToken;

use super::{asset_not_found, locate_assets};

#[derive(Debug)]
struct Grant {
    granted_at: DateTime<Utc>,
    assets: HashMap<AssetKind, (String, PathBuf)>,
}

/// Token to asset table held in process memory.
///
/// Only usable when the delivery layer runs in the same process and asks
/// this provisioner to resolve requests.
#[derive(Debug, Clone)]
pub struct MemoryProvisioner {
    table: Arc<DashMap<AccessToken, Grant>>,
    media_root: PathBuf,
    base_url: String,
}

impl MemoryProvisioner {
    /// Create an empty table.
    pub fn new(media_root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            table: Arc::new(DashMap::new()),
            media_root: media_root.into(),
            base_url: base_url.into(),
        }
    }

    /// Number of live access points.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether no access point is live.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn urls(&self, token: &AccessToken, grant: &Grant) -> Vec<StreamingUrl> {
        AssetKind::ALL
            .into_iter()
            .filter_map(|kind| {
                grant
                    .assets
                    .get(&kind)
                    .map(|(name, _)| StreamingUrl::new(&self.base_url, token, kind, name.clone()))
            })
            .collect()
    }
}

#[async_trait]
impl AccessProvisioner for MemoryProvisioner {
    fn provider_type(&self) -> &str {
        "memory"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }

    async fn grant(
        &self,
        token: &AccessToken,
        assets: &MediaAssets,
    ) -> AppResult<Vec<StreamingUrl>> {
        let located = locate_assets(&self.media_root, assets).await?;
        let grant = Grant {
            granted_at: Utc::now(),
            assets: located
                .into_iter()
                .map(|(kind, name, path)| (kind, (name, path)))
                .collect(),
        };
        let urls = self.urls(token, &grant);

        match self.table.entry(*token) {
            Entry::Occupied(_) => {
                return Err(AppError::conflict(format!(
                    "Access point {} already exists",
                    token.short()
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(grant);
            }
        }

        debug!(token = %token.short(), "Granted in-memory access point");
        Ok(urls)
    }

    async fn revoke(&self, token: &AccessToken) -> AppResult<()> {
        if self.table.remove(token).is_some() {
            debug!(token = %token.short(), "Revoked in-memory access point");
        }
        Ok(())
    }

    async fn resolve(&self, token: &str, asset_name: &str) -> AppResult<PathBuf> {
        let token = AccessToken::parse(token).ok_or_else(asset_not_found)?;
        let kind = AssetKind::from_public_name(asset_name).ok_or_else(asset_not_found)?;
        let entry = self.table.get(&token).ok_or_else(asset_not_found)?;
        match entry.assets.get(&kind) {
            Some((name, path)) if name == asset_name => Ok(path.clone()),
            _ => Err(asset_not_found()),
        }
    }

    async fn tokens(&self) -> AppResult<Vec<AccessToken>> {
        Ok(self.table.iter().map(|e| *e.key()).collect())
    }

    async fn inspect(&self, token: &AccessToken) -> AppResult<Option<AccessPoint>> {
        Ok(self.table.get(token).map(|grant| AccessPoint {
            token: *token,
            granted_at: grant.granted_at,
            streaming_urls: self.urls(token, &grant),
        }))
    }
}

//! Filesystem capability directories.
//!
//! Each live token owns one directory under the root, named after the
//! token and holding one symlink per asset (`primary.mp4`, `subtitles.vtt`,
//! ...). A static file server pointed at the root serves exactly what is
//! linked, and revoking is a single directory removal.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, warn};

use rewind_core::error::{AppError, ErrorKind};
use rewind_core::result::AppResult;
use rewind_core::traits::{
    AccessPoint, AccessProvisioner, AssetKind, MediaAssets, StreamingUrl,
};
use rewind_core::types::AccessToken;

use super::{asset_not_found, locate_assets};

const STAGING_PREFIX: &str = ".staging-";

/// Symlink-directory provisioner.
#[derive(Debug, Clone)]
pub struct SymlinkProvisioner {
    root: PathBuf,
    media_root: PathBuf,
    base_url: String,
}

impl SymlinkProvisioner {
    /// Create a provisioner, creating `root_path` if needed.
    pub async fn new(
        root_path: impl Into<PathBuf>,
        media_root: impl Into<PathBuf>,
        base_url: impl Into<String>,
    ) -> AppResult<Self> {
        let root = root_path.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create access root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self {
            root,
            media_root: media_root.into(),
            base_url: base_url.into(),
        })
    }

    fn token_dir(&self, token: &AccessToken) -> PathBuf {
        self.root.join(token.to_string())
    }

    fn staging_dir(&self, token: &AccessToken) -> PathBuf {
        self.root.join(format!("{STAGING_PREFIX}{token}"))
    }

    async fn remove_tree(path: &Path) -> AppResult<()> {
        match fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::with_source(
                ErrorKind::Storage,
                "Failed to remove access directory",
                e,
            )),
        }
    }

    async fn modified_at(path: &Path) -> AppResult<Option<DateTime<Utc>>> {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => Ok(Some(meta.modified()?.into())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::with_source(
                ErrorKind::Storage,
                "Failed to read access directory",
                e,
            )),
        }
    }

    /// URLs for the links actually present in a published directory.
    async fn linked_urls(&self, token: &AccessToken, dir: &Path) -> AppResult<Vec<StreamingUrl>> {
        let mut entries = fs::read_dir(dir).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to list access directory", e)
        })?;
        let mut urls = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(kind) = AssetKind::from_public_name(name) {
                urls.push(StreamingUrl::new(&self.base_url, token, kind, name.to_string()));
            }
        }
        urls.sort_by_key(|u| u.kind);
        Ok(urls)
    }

    async fn populate(staging: &Path, links: &[(AssetKind, String, PathBuf)]) -> AppResult<()> {
        fs::create_dir(staging).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to create staging directory", e)
        })?;
        for (kind, name, target) in links {
            let target = fs::canonicalize(target).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to resolve {kind} asset"),
                    e,
                )
            })?;
            fs::symlink(&target, staging.join(name)).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to link {kind} asset"),
                    e,
                )
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl AccessProvisioner for SymlinkProvisioner {
    fn provider_type(&self) -> &str {
        "symlink"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }

    async fn grant(
        &self,
        token: &AccessToken,
        assets: &MediaAssets,
    ) -> AppResult<Vec<StreamingUrl>> {
        let links = locate_assets(&self.media_root, assets).await?;

        let target = self.token_dir(token);
        if fs::try_exists(&target).await.unwrap_or(false) {
            return Err(AppError::conflict(format!(
                "Access point {} already exists",
                token.short()
            )));
        }

        let staging = self.staging_dir(token);
        Self::remove_tree(&staging).await?;
        if let Err(e) = Self::populate(&staging, &links).await {
            Self::remove_tree(&staging).await?;
            return Err(e);
        }
        if let Err(e) = fs::rename(&staging, &target).await {
            Self::remove_tree(&staging).await?;
            return Err(AppError::with_source(
                ErrorKind::Storage,
                "Failed to publish access directory",
                e,
            ));
        }

        debug!(token = %token.short(), assets = links.len(), "Granted access directory");
        Ok(links
            .into_iter()
            .map(|(kind, name, _)| StreamingUrl::new(&self.base_url, token, kind, name))
            .collect())
    }

    async fn revoke(&self, token: &AccessToken) -> AppResult<()> {
        Self::remove_tree(&self.token_dir(token)).await?;
        Self::remove_tree(&self.staging_dir(token)).await?;
        debug!(token = %token.short(), "Revoked access directory");
        Ok(())
    }

    async fn resolve(&self, token: &str, asset_name: &str) -> AppResult<PathBuf> {
        let token = AccessToken::parse(token).ok_or_else(asset_not_found)?;
        AssetKind::from_public_name(asset_name).ok_or_else(asset_not_found)?;

        let link = self.token_dir(&token).join(asset_name);
        let target = fs::read_link(&link).await.map_err(|_| asset_not_found())?;
        if !fs::try_exists(&target).await.unwrap_or(false) {
            warn!(token = %token.short(), asset = asset_name, "Access link target is gone");
            return Err(asset_not_found());
        }
        Ok(target)
    }

    async fn tokens(&self) -> AppResult<Vec<AccessToken>> {
        let mut entries = fs::read_dir(&self.root).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to list access root", e)
        })?;

        let mut tokens = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(token) = AccessToken::parse(name) {
                tokens.push(token);
            } else if let Some(token) = name
                .strip_prefix(STAGING_PREFIX)
                .and_then(AccessToken::parse)
            {
                // half-built grant from a crash; revoke clears it
                tokens.push(token);
            }
        }
        Ok(tokens)
    }

    async fn inspect(&self, token: &AccessToken) -> AppResult<Option<AccessPoint>> {
        let dir = self.token_dir(token);
        if let Some(granted_at) = Self::modified_at(&dir).await? {
            return Ok(Some(AccessPoint {
                token: *token,
                granted_at,
                streaming_urls: self.linked_urls(token, &dir).await?,
            }));
        }
        Ok(Self::modified_at(&self.staging_dir(token))
            .await?
            .map(|granted_at| AccessPoint {
                token: *token,
                granted_at,
                streaming_urls: Vec::new(),
            }))
    }
}

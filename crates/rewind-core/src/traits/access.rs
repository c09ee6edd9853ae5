//! Access point provisioner trait for token-addressed media exposure.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::AppResult;
use crate::types::id::AccessToken;

/// The media files a title may have on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Primary-audio video file.
    Primary,
    /// Alternate-audio video file.
    Alternate,
    /// Subtitle track.
    Subtitles,
}

impl AssetKind {
    /// Every kind, in URL listing order.
    pub const ALL: [AssetKind; 3] = [Self::Primary, Self::Alternate, Self::Subtitles];

    /// Stem of the public asset name.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Alternate => "alternate",
            Self::Subtitles => "subtitles",
        }
    }

    /// Public file name for an asset of this kind backed by `real_path`.
    ///
    /// Keeps the real extension so the delivery layer can pick a content
    /// type, and nothing else of the real path.
    pub fn public_name(&self, real_path: &Path) -> String {
        match real_path.extension().and_then(|e| e.to_str()) {
            Some(ext) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
                format!("{}.{}", self.slug(), ext.to_lowercase())
            }
            _ => self.slug().to_string(),
        }
    }

    /// Recover the kind from a public asset name (`primary.mp4` -> `Primary`).
    ///
    /// Only `slug` or `slug.ext` with an alphanumeric extension is accepted,
    /// so a valid name is always a single path component.
    pub fn from_public_name(name: &str) -> Option<Self> {
        let (stem, ext) = match name.split_once('.') {
            Some((stem, ext)) => (stem, Some(ext)),
            None => (name, None),
        };
        if let Some(ext) = ext {
            if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                return None;
            }
        }
        Self::ALL.into_iter().find(|k| k.slug() == stem)
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// Real locations of a title's media files. Absent kinds are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAssets {
    /// Primary-audio video file.
    pub primary_audio: Option<PathBuf>,
    /// Alternate-audio video file.
    pub alt_audio: Option<PathBuf>,
    /// Subtitle file.
    pub subtitle: Option<PathBuf>,
}

impl MediaAssets {
    /// Path for a given kind, if present.
    pub fn get(&self, kind: AssetKind) -> Option<&Path> {
        match kind {
            AssetKind::Primary => self.primary_audio.as_deref(),
            AssetKind::Alternate => self.alt_audio.as_deref(),
            AssetKind::Subtitles => self.subtitle.as_deref(),
        }
    }

    /// Present assets in listing order.
    pub fn present(&self) -> Vec<(AssetKind, &Path)> {
        AssetKind::ALL
            .into_iter()
            .filter_map(|kind| self.get(kind).map(|path| (kind, path)))
            .collect()
    }

    /// Whether no asset is declared at all.
    pub fn is_empty(&self) -> bool {
        self.present().is_empty()
    }

    /// Resolve relative paths against `root`. Absolute paths are kept.
    pub fn rooted_at(&self, root: &Path) -> Self {
        let join = |p: &Option<PathBuf>| p.as_ref().map(|p| root.join(p));
        Self {
            primary_audio: join(&self.primary_audio),
            alt_audio: join(&self.alt_audio),
            subtitle: join(&self.subtitle),
        }
    }
}

/// One streaming URL handed to the rental holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingUrl {
    /// Which asset this URL serves.
    pub kind: AssetKind,
    /// Public asset name, the last URL segment.
    pub asset_name: String,
    /// Full URL, embedding the access token.
    pub url: String,
}

impl StreamingUrl {
    /// Build the URL for `asset_name` under `token`.
    pub fn new(base_url: &str, token: &AccessToken, kind: AssetKind, asset_name: String) -> Self {
        let url = format!("{}/{}/{}", base_url.trim_end_matches('/'), token, asset_name);
        Self {
            kind,
            asset_name,
            url,
        }
    }
}

/// What a backend currently holds for one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint {
    /// The token naming the access point.
    pub token: AccessToken,
    /// When the backend created it.
    pub granted_at: DateTime<Utc>,
    /// One URL per linked asset, in listing order. Empty while a grant is
    /// still being built.
    pub streaming_urls: Vec<StreamingUrl>,
}

/// Trait for access point backends.
///
/// An access point is an indirection named by an unguessable token that
/// exposes exactly one rental's media files without revealing where they
/// live. Implementations exist for filesystem symlink directories and an
/// in-memory mapping table; both live in `rewind-storage`.
#[async_trait]
pub trait AccessProvisioner: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "symlink", "memory").
    fn provider_type(&self) -> &str;

    /// Check whether the backend is usable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Create the access point for `token`, exposing every present asset.
    ///
    /// All-or-nothing: if any declared asset is missing, nothing is left
    /// behind and a storage error is returned. Returns one URL per asset.
    async fn grant(&self, token: &AccessToken, assets: &MediaAssets)
    -> AppResult<Vec<StreamingUrl>>;

    /// Tear down the access point. Unknown or already revoked tokens are
    /// a success. Never touches other tokens.
    async fn revoke(&self, token: &AccessToken) -> AppResult<()>;

    /// Turn a public `(token, asset_name)` request into the real file.
    ///
    /// Unknown, malformed, and revoked tokens all produce the same
    /// not-found error.
    async fn resolve(&self, token: &str, asset_name: &str) -> AppResult<PathBuf>;

    /// Every token with a live access point.
    async fn tokens(&self) -> AppResult<Vec<AccessToken>>;

    /// Describe the access point for `token` as the backend holds it, or
    /// `None` when there is none.
    async fn inspect(&self, token: &AccessToken) -> AppResult<Option<AccessPoint>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_name_keeps_extension_only() {
        let name = AssetKind::Primary.public_name(Path::new("/srv/films/1999/Matrix.MP4"));
        assert_eq!(name, "primary.mp4");
        assert_eq!(
            AssetKind::Subtitles.public_name(Path::new("subs/en")),
            "subtitles"
        );
    }

    #[test]
    fn test_from_public_name() {
        assert_eq!(
            AssetKind::from_public_name("alternate.mkv"),
            Some(AssetKind::Alternate)
        );
        assert_eq!(AssetKind::from_public_name("primary"), Some(AssetKind::Primary));
        assert_eq!(AssetKind::from_public_name("poster.jpg"), None);
        assert_eq!(AssetKind::from_public_name("primary./../x"), None);
        assert_eq!(AssetKind::from_public_name("primary.mp4/evil"), None);
        assert_eq!(AssetKind::from_public_name("subtitles."), None);
    }

    #[test]
    fn test_present_skips_missing() {
        let assets = MediaAssets {
            primary_audio: Some(PathBuf::from("a.mp4")),
            alt_audio: None,
            subtitle: Some(PathBuf::from("a.vtt")),
        };
        let kinds: Vec<_> = assets.present().into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![AssetKind::Primary, AssetKind::Subtitles]);
        assert!(MediaAssets::default().is_empty());
    }

    #[test]
    fn test_streaming_url_shape() {
        let token = AccessToken::new();
        let url = StreamingUrl::new(
            "https://cdn.example/stream/",
            &token,
            AssetKind::Primary,
            "primary.mp4".into(),
        );
        assert_eq!(
            url.url,
            format!("https://cdn.example/stream/{token}/primary.mp4")
        );
    }
}

//! Access point provisioner implementations.

pub mod memory;
#[cfg(unix)]
pub mod symlink;

pub use memory::MemoryProvisioner;
#[cfg(unix)]
pub use symlink::SymlinkProvisioner;

use std::path::{Path, PathBuf};

use rewind_core::error::{AppError, ErrorKind};
use rewind_core::result::AppResult;
use rewind_core::traits::{AssetKind, MediaAssets};
use tracing::warn;

/// Uniform answer for anything that does not resolve.
pub(crate) fn asset_not_found() -> AppError {
    AppError::not_found("Asset not found")
}

/// Resolve every present asset against `media_root` and check it exists.
///
/// Returns `(kind, public name, real path)` for each, or a storage error
/// naming the first missing kind.
pub(crate) async fn locate_assets(
    media_root: &Path,
    assets: &MediaAssets,
) -> AppResult<Vec<(AssetKind, String, PathBuf)>> {
    let rooted = assets.rooted_at(media_root);
    let mut located = Vec::new();
    for (kind, path) in rooted.present() {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                warn!(asset = %kind, path = %path.display(), "Declared asset is not a file");
                return Err(AppError::storage(format!("Declared {kind} asset is not a file")));
            }
            Err(e) => {
                warn!(asset = %kind, path = %path.display(), "Declared asset is missing");
                return Err(AppError::with_source(
                    ErrorKind::Storage,
                    format!("Declared {kind} asset is missing"),
                    e,
                ));
            }
        }
        located.push((kind, kind.public_name(path), path.to_path_buf()));
    }
    Ok(located)
}

//! Film listing model.

use std::path::PathBuf;

use rewind_core::traits::MediaAssets;
use rewind_core::types::FilmId;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Read-only view of a catalog title: availability and media on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FilmListing {
    /// Film identifier.
    pub id: FilmId,
    /// Display title.
    pub title: String,
    /// Release year, if known. Drives the rental tier.
    pub release_year: Option<i32>,
    /// Whether the title is currently offered for rent.
    pub is_available: bool,
    /// Primary-audio video file, relative to the media root.
    pub primary_audio_path: Option<String>,
    /// Alternate-audio video file, relative to the media root.
    pub alt_audio_path: Option<String>,
    /// Subtitle file, relative to the media root.
    pub subtitle_path: Option<String>,
}

impl FilmListing {
    /// Media assets declared for this title.
    pub fn assets(&self) -> MediaAssets {
        MediaAssets {
            primary_audio: self.primary_audio_path.as_ref().map(PathBuf::from),
            alt_audio: self.alt_audio_path.as_ref().map(PathBuf::from),
            subtitle: self.subtitle_path.as_ref().map(PathBuf::from),
        }
    }
}

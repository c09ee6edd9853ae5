//! Catalog lookup against the `films` table.

use async_trait::async_trait;
use sqlx::PgPool;

use rewind_core::result::AppResult;
use rewind_core::types::FilmId;
use rewind_entity::film::FilmListing;

use super::db_error;
use crate::store::Catalog;

/// Read-only catalog repository.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    /// Create a new catalog repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn get_film(&self, film_id: FilmId) -> AppResult<Option<FilmListing>> {
        sqlx::query_as::<_, FilmListing>(
            "SELECT id, title, release_year, is_available, primary_audio_path, \
             alt_audio_path, subtitle_path FROM films WHERE id = $1",
        )
        .bind(film_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find film", e))
    }
}

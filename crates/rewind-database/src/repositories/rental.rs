//! Rental store repository.
//!
//! Single holder per film is enforced by the partial unique index
//! `rentals_one_active_per_film`; a concurrent admission that loses the
//! race surfaces as a unique violation and is reported as whatever row won.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use rewind_core::error::AppError;
use rewind_core::result::AppResult;
use rewind_core::types::{AccessToken, FilmId, RentalId, UserId};
use rewind_entity::credit::CreditReason;
use rewind_entity::rental::{NewRental, Rental, RentalEndReason, ViewingMode};

use super::credit::{balance_in, credit_in, debit_in, journal_in};
use super::{db_error, is_unique_violation};
use crate::store::{AdmitOutcome, ClaimOutcome, RentalFilter, RentalStore};

/// PostgreSQL-backed rental store.
#[derive(Debug, Clone)]
pub struct PgRentalStore {
    pool: PgPool,
}

impl PgRentalStore {
    /// Create a new rental repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn holder_outcome(winner: Option<Rental>, user_id: UserId) -> AdmitOutcome {
        match winner {
            Some(rental) if rental.is_held_by(user_id) => AdmitOutcome::Existing(rental),
            _ => AdmitOutcome::HeldByOther,
        }
    }
}

#[async_trait]
impl RentalStore for PgRentalStore {
    async fn find_by_id(&self, id: RentalId) -> AppResult<Option<Rental>> {
        sqlx::query_as::<_, Rental>("SELECT * FROM rentals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find rental", e))
    }

    async fn find_active_by_film(&self, film_id: FilmId) -> AppResult<Option<Rental>> {
        sqlx::query_as::<_, Rental>("SELECT * FROM rentals WHERE film_id = $1 AND is_active")
            .bind(film_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find active rental for film", e))
    }

    async fn find_active_by_user(&self, user_id: UserId) -> AppResult<Vec<Rental>> {
        sqlx::query_as::<_, Rental>(
            "SELECT * FROM rentals WHERE user_id = $1 AND is_active ORDER BY rented_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find active rentals for user", e))
    }

    async fn find_by_user(&self, user_id: UserId) -> AppResult<Vec<Rental>> {
        sqlx::query_as::<_, Rental>(
            "SELECT * FROM rentals WHERE user_id = $1 ORDER BY rented_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find rental history", e))
    }

    async fn list(&self, filter: &RentalFilter) -> AppResult<Vec<Rental>> {
        sqlx::query_as::<_, Rental>(
            "SELECT * FROM rentals \
             WHERE ($1::uuid IS NULL OR user_id = $1) \
               AND ($2::uuid IS NULL OR film_id = $2) \
               AND ($3 OR is_active) \
             ORDER BY rented_at DESC LIMIT $4",
        )
        .bind(filter.user_id)
        .bind(filter.film_id)
        .bind(filter.include_ended)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list rentals", e))
    }

    async fn find_stale(&self, now: DateTime<Utc>) -> AppResult<Vec<Rental>> {
        sqlx::query_as::<_, Rental>(
            "SELECT * FROM rentals WHERE is_active AND expires_at <= $1 ORDER BY expires_at",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find stale rentals", e))
    }

    async fn find_active_tokens(&self) -> AppResult<Vec<AccessToken>> {
        sqlx::query_scalar::<_, AccessToken>(
            "SELECT access_token FROM rentals WHERE is_active AND access_token IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list active access tokens", e))
    }

    async fn admit(&self, new: NewRental) -> AppResult<AdmitOutcome> {
        if new.cost < 0 {
            return Err(AppError::validation("Rental cost must not be negative"));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin admission", e))?;

        let held = sqlx::query_as::<_, Rental>(
            "SELECT * FROM rentals WHERE film_id = $1 AND is_active FOR UPDATE",
        )
        .bind(new.film_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to check film holder", e))?;
        if let Some(rental) = held {
            return Ok(Self::holder_outcome(Some(rental), new.user_id));
        }

        if new.cost > 0 && debit_in(&mut tx, new.user_id, new.cost).await?.is_none() {
            let balance = balance_in(&mut tx, new.user_id).await?;
            return Ok(AdmitOutcome::InsufficientCredits { balance });
        }

        let inserted = sqlx::query_as::<_, Rental>(
            "INSERT INTO rentals (id, user_id, film_id, access_token, rented_at, expires_at, tier, cost) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(new.id)
        .bind(new.user_id)
        .bind(new.film_id)
        .bind(new.access_token)
        .bind(new.rented_at)
        .bind(new.expires_at)
        .bind(new.tier)
        .bind(new.cost)
        .fetch_one(&mut *tx)
        .await;

        let rental = match inserted {
            Ok(rental) => rental,
            Err(e) if is_unique_violation(&e) => {
                tx.rollback()
                    .await
                    .map_err(|e| db_error("Failed to roll back admission", e))?;
                debug!(film_id = %new.film_id, "Lost admission race");
                let winner = self.find_active_by_film(new.film_id).await?;
                return Ok(Self::holder_outcome(winner, new.user_id));
            }
            Err(e) => return Err(db_error("Failed to insert rental", e)),
        };

        if new.cost > 0 {
            journal_in(&mut tx, new.user_id, -new.cost, CreditReason::Rental, Some(rental.id))
                .await?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit admission", e))?;
        Ok(AdmitOutcome::Granted(rental))
    }

    async fn set_viewing_mode(
        &self,
        id: RentalId,
        mode: ViewingMode,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Rental>> {
        sqlx::query_as::<_, Rental>(
            "UPDATE rentals SET viewing_mode = $2 \
             WHERE id = $1 AND viewing_mode = 'unset' AND is_active AND expires_at > $3 \
             RETURNING *",
        )
        .bind(id)
        .bind(mode)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to set viewing mode", e))
    }

    async fn record_progress(
        &self,
        id: RentalId,
        percent: i16,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Rental>> {
        sqlx::query_as::<_, Rental>(
            "UPDATE rentals SET watch_progress_percent = GREATEST(watch_progress_percent, $2) \
             WHERE id = $1 AND is_active AND expires_at > $3 RETURNING *",
        )
        .bind(id)
        .bind(percent.clamp(0, 100))
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to record progress", e))
    }

    async fn claim_rewind(
        &self,
        id: RentalId,
        threshold_percent: i16,
        reward: i64,
    ) -> AppResult<ClaimOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin claim", e))?;

        let claimed = sqlx::query_as::<_, Rental>(
            "UPDATE rentals SET rewind_claimed = TRUE \
             WHERE id = $1 AND NOT rewind_claimed AND watch_progress_percent >= $2 \
             RETURNING *",
        )
        .bind(id)
        .bind(threshold_percent)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to claim reward", e))?;

        let Some(rental) = claimed else {
            tx.rollback()
                .await
                .map_err(|e| db_error("Failed to roll back claim", e))?;
            let current = self
                .find_by_id(id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Rental {id} not found")))?;
            return Ok(if current.rewind_claimed {
                ClaimOutcome::AlreadyClaimed
            } else {
                ClaimOutcome::NotEligible {
                    progress: current.watch_progress_percent,
                }
            });
        };

        if reward > 0 {
            credit_in(&mut tx, rental.user_id, reward).await?;
            journal_in(
                &mut tx,
                rental.user_id,
                reward,
                CreditReason::RewindReward,
                Some(rental.id),
            )
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit claim", e))?;
        Ok(ClaimOutcome::Claimed(rental))
    }

    async fn mark_return_requested(
        &self,
        id: RentalId,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Rental>> {
        sqlx::query_as::<_, Rental>(
            "UPDATE rentals SET return_requested = TRUE \
             WHERE id = $1 AND NOT return_requested AND is_active AND expires_at > $2 \
             RETURNING *",
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to mark return requested", e))
    }

    async fn deactivate(
        &self,
        id: RentalId,
        reason: RentalEndReason,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Rental>> {
        let ended = sqlx::query_as::<_, Rental>(
            "UPDATE rentals \
             SET is_active = FALSE, access_token = NULL, ended_at = $3, end_reason = $2 \
             WHERE id = $1 AND is_active RETURNING *",
        )
        .bind(id)
        .bind(reason)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to deactivate rental", e))?;

        if ended.is_none() {
            debug!(rental_id = %id, "Deactivate found no active row");
        }
        Ok(ended)
    }
}

//! In-memory rental store, credit ledger, and catalog.
//!
//! All state sits behind one async mutex, so every trait method is a
//! single atomic unit of work. Suitable for single-node deployments and
//! tests; nothing survives a restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use rewind_core::error::AppError;
use rewind_core::result::AppResult;
use rewind_core::types::{AccessToken, CreditTransactionId, FilmId, RentalId, UserId};
use rewind_entity::credit::{CreditReason, CreditTransaction};
use rewind_entity::film::FilmListing;
use rewind_entity::rental::{NewRental, Rental, RentalEndReason, ViewingMode};

use crate::store::{
    AdmitOutcome, Catalog, ClaimOutcome, CreditLedger, DebitOutcome, RentalFilter, RentalStore,
};

#[derive(Debug, Default)]
struct State {
    films: HashMap<FilmId, FilmListing>,
    rentals: HashMap<RentalId, Rental>,
    balances: HashMap<UserId, i64>,
    journal: Vec<CreditTransaction>,
}

impl State {
    fn active_for_film(&self, film_id: FilmId) -> Option<&Rental> {
        self.rentals
            .values()
            .find(|r| r.film_id == film_id && r.is_active)
    }

    fn live_mut(&mut self, id: RentalId, now: DateTime<Utc>) -> Option<&mut Rental> {
        self.rentals.get_mut(&id).filter(|r| r.is_live_at(now))
    }

    fn record(
        &mut self,
        user_id: UserId,
        amount: i64,
        reason: CreditReason,
        rental_id: Option<RentalId>,
    ) {
        if amount == 0 {
            return;
        }
        self.journal.push(CreditTransaction {
            id: CreditTransactionId::new(),
            user_id,
            amount,
            reason,
            rental_id,
            created_at: Utc::now(),
        });
    }

    fn sorted_newest_first(mut rentals: Vec<Rental>) -> Vec<Rental> {
        rentals.sort_by(|a, b| b.rented_at.cmp(&a.rented_at));
        rentals
    }
}

/// Process-local implementation of every storage trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_next_insert: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a catalog entry.
    pub async fn upsert_film(&self, film: FilmListing) {
        self.state.lock().await.films.insert(film.id, film);
    }

    /// Overwrite a user's balance without journaling.
    pub async fn set_balance(&self, user_id: UserId, balance: i64) {
        self.state.lock().await.balances.insert(user_id, balance);
    }

    /// Journal entries for a user, oldest first.
    pub async fn transactions(&self, user_id: UserId) -> Vec<CreditTransaction> {
        self.state
            .lock()
            .await
            .journal
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Make the next rental insertion fail after the debit has been taken,
    /// to exercise the rollback path.
    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RentalStore for MemoryStore {
    async fn find_by_id(&self, id: RentalId) -> AppResult<Option<Rental>> {
        Ok(self.state.lock().await.rentals.get(&id).cloned())
    }

    async fn find_active_by_film(&self, film_id: FilmId) -> AppResult<Option<Rental>> {
        Ok(self.state.lock().await.active_for_film(film_id).cloned())
    }

    async fn find_active_by_user(&self, user_id: UserId) -> AppResult<Vec<Rental>> {
        let state = self.state.lock().await;
        let rentals = state
            .rentals
            .values()
            .filter(|r| r.user_id == user_id && r.is_active)
            .cloned()
            .collect();
        Ok(State::sorted_newest_first(rentals))
    }

    async fn find_by_user(&self, user_id: UserId) -> AppResult<Vec<Rental>> {
        let state = self.state.lock().await;
        let rentals = state
            .rentals
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        Ok(State::sorted_newest_first(rentals))
    }

    async fn list(&self, filter: &RentalFilter) -> AppResult<Vec<Rental>> {
        let state = self.state.lock().await;
        let rentals = state
            .rentals
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        let mut rentals = State::sorted_newest_first(rentals);
        if let Some(limit) = filter.limit {
            rentals.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(rentals)
    }

    async fn find_stale(&self, now: DateTime<Utc>) -> AppResult<Vec<Rental>> {
        let state = self.state.lock().await;
        let mut stale: Vec<Rental> = state
            .rentals
            .values()
            .filter(|r| r.is_stale_at(now))
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.expires_at);
        Ok(stale)
    }

    async fn find_active_tokens(&self) -> AppResult<Vec<AccessToken>> {
        let state = self.state.lock().await;
        Ok(state
            .rentals
            .values()
            .filter(|r| r.is_active)
            .filter_map(|r| r.access_token)
            .collect())
    }

    async fn admit(&self, new: NewRental) -> AppResult<AdmitOutcome> {
        if new.cost < 0 {
            return Err(AppError::validation("Rental cost must not be negative"));
        }
        let mut state = self.state.lock().await;

        if let Some(held) = state.active_for_film(new.film_id) {
            return Ok(if held.is_held_by(new.user_id) {
                AdmitOutcome::Existing(held.clone())
            } else {
                AdmitOutcome::HeldByOther
            });
        }

        let balance = state.balances.get(&new.user_id).copied().unwrap_or(0);
        if balance < new.cost {
            return Ok(AdmitOutcome::InsufficientCredits { balance });
        }
        state.balances.insert(new.user_id, balance - new.cost);

        if self.fail_next_insert.swap(false, Ordering::SeqCst) || state.rentals.contains_key(&new.id) {
            state.balances.insert(new.user_id, balance);
            debug!(rental_id = %new.id, "Rental insert failed, debit restored");
            return Err(AppError::database(format!("Failed to insert rental {}", new.id)));
        }

        let rental = new.into_rental();
        state.record(rental.user_id, -rental.cost, CreditReason::Rental, Some(rental.id));
        state.rentals.insert(rental.id, rental.clone());
        Ok(AdmitOutcome::Granted(rental))
    }

    async fn set_viewing_mode(
        &self,
        id: RentalId,
        mode: ViewingMode,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Rental>> {
        let mut state = self.state.lock().await;
        Ok(state
            .live_mut(id, now)
            .filter(|r| !r.viewing_mode.is_set())
            .map(|r| {
                r.viewing_mode = mode;
                r.clone()
            }))
    }

    async fn record_progress(
        &self,
        id: RentalId,
        percent: i16,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Rental>> {
        let mut state = self.state.lock().await;
        Ok(state.live_mut(id, now).map(|r| {
            r.watch_progress_percent = r.watch_progress_percent.max(percent.clamp(0, 100));
            r.clone()
        }))
    }

    async fn claim_rewind(
        &self,
        id: RentalId,
        threshold_percent: i16,
        reward: i64,
    ) -> AppResult<ClaimOutcome> {
        let mut state = self.state.lock().await;
        let rental = state
            .rentals
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Rental {id} not found")))?;

        if rental.rewind_claimed {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }
        if rental.watch_progress_percent < threshold_percent {
            return Ok(ClaimOutcome::NotEligible {
                progress: rental.watch_progress_percent,
            });
        }
        rental.rewind_claimed = true;
        let rental = rental.clone();

        *state.balances.entry(rental.user_id).or_insert(0) += reward;
        state.record(rental.user_id, reward, CreditReason::RewindReward, Some(rental.id));
        Ok(ClaimOutcome::Claimed(rental))
    }

    async fn mark_return_requested(
        &self,
        id: RentalId,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Rental>> {
        let mut state = self.state.lock().await;
        Ok(state
            .live_mut(id, now)
            .filter(|r| !r.return_requested)
            .map(|r| {
                r.return_requested = true;
                r.clone()
            }))
    }

    async fn deactivate(
        &self,
        id: RentalId,
        reason: RentalEndReason,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Rental>> {
        let mut state = self.state.lock().await;
        Ok(state
            .rentals
            .get_mut(&id)
            .filter(|r| r.is_active)
            .map(|r| {
                r.is_active = false;
                r.access_token = None;
                r.ended_at = Some(now);
                r.end_reason = Some(reason);
                r.clone()
            }))
    }
}

#[async_trait]
impl CreditLedger for MemoryStore {
    async fn balance(&self, user_id: UserId) -> AppResult<i64> {
        Ok(self
            .state
            .lock()
            .await
            .balances
            .get(&user_id)
            .copied()
            .unwrap_or(0))
    }

    async fn debit(
        &self,
        user_id: UserId,
        amount: i64,
        reason: CreditReason,
        rental_id: Option<RentalId>,
    ) -> AppResult<DebitOutcome> {
        if amount < 0 {
            return Err(AppError::validation("Debit amount must not be negative"));
        }
        let mut state = self.state.lock().await;
        let balance = state.balances.get(&user_id).copied().unwrap_or(0);
        if balance < amount {
            return Ok(DebitOutcome::Insufficient(balance));
        }
        state.balances.insert(user_id, balance - amount);
        state.record(user_id, -amount, reason, rental_id);
        Ok(DebitOutcome::Debited(balance - amount))
    }

    async fn credit(
        &self,
        user_id: UserId,
        amount: i64,
        reason: CreditReason,
        rental_id: Option<RentalId>,
    ) -> AppResult<i64> {
        if amount < 0 {
            return Err(AppError::validation("Credit amount must not be negative"));
        }
        let mut state = self.state.lock().await;
        let balance = state.balances.entry(user_id).or_insert(0);
        *balance += amount;
        let balance = *balance;
        state.record(user_id, amount, reason, rental_id);
        Ok(balance)
    }
}

#[async_trait]
impl Catalog for MemoryStore {
    async fn get_film(&self, film_id: FilmId) -> AppResult<Option<FilmListing>> {
        Ok(self.state.lock().await.films.get(&film_id).cloned())
    }
}

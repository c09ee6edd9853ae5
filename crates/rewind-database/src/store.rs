//! Storage traits the rental engine is written against.
//!
//! Every mutation that touches more than one piece of shared state is a
//! single method here, so each backend can make it one atomic unit of
//! work. Conditional updates return `None` when their guard did not hold;
//! callers re-read the row to decide why.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use rewind_core::result::AppResult;
use rewind_core::types::{AccessToken, FilmId, RentalId, UserId};
use rewind_entity::credit::CreditReason;
use rewind_entity::film::FilmListing;
use rewind_entity::rental::{NewRental, Rental, RentalEndReason, ViewingMode};

/// Result of the admission unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// Debited and inserted.
    Granted(Rental),
    /// The user already holds the active rental for this film. Nothing
    /// was debited.
    Existing(Rental),
    /// Another user holds the active rental for this film.
    HeldByOther,
    /// The conditional debit failed.
    InsufficientCredits {
        /// Balance seen inside the unit of work.
        balance: i64,
    },
}

/// Result of a rewind reward claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Flag flipped and ledger credited.
    Claimed(Rental),
    /// The reward was already paid for this rental.
    AlreadyClaimed,
    /// Watch progress is below the threshold.
    NotEligible {
        /// Stored progress.
        progress: i16,
    },
}

/// Result of a conditional debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    /// Balance after the debit.
    Debited(i64),
    /// Balance that was too low.
    Insufficient(i64),
}

/// Listing filter for operator views.
#[derive(Debug, Clone, Default)]
pub struct RentalFilter {
    /// Only this holder's rentals.
    pub user_id: Option<UserId>,
    /// Only rentals of this film.
    pub film_id: Option<FilmId>,
    /// Include ended rentals.
    pub include_ended: bool,
    /// Maximum rows, newest first.
    pub limit: Option<i64>,
}

impl RentalFilter {
    /// Whether `rental` passes the filter (ignores `limit`).
    pub fn matches(&self, rental: &Rental) -> bool {
        self.user_id.is_none_or(|u| rental.user_id == u)
            && self.film_id.is_none_or(|f| rental.film_id == f)
            && (self.include_ended || rental.is_active)
    }
}

/// System of record for rental rows.
#[async_trait]
pub trait RentalStore: Send + Sync + std::fmt::Debug + 'static {
    /// Find a rental by id.
    async fn find_by_id(&self, id: RentalId) -> AppResult<Option<Rental>>;

    /// The active rental for a film, stale or not.
    async fn find_active_by_film(&self, film_id: FilmId) -> AppResult<Option<Rental>>;

    /// A holder's active rentals, newest first.
    async fn find_active_by_user(&self, user_id: UserId) -> AppResult<Vec<Rental>>;

    /// Every rental a holder ever had, newest first.
    async fn find_by_user(&self, user_id: UserId) -> AppResult<Vec<Rental>>;

    /// Operator listing.
    async fn list(&self, filter: &RentalFilter) -> AppResult<Vec<Rental>>;

    /// Active rentals whose deadline is at or before `now`.
    async fn find_stale(&self, now: DateTime<Utc>) -> AppResult<Vec<Rental>>;

    /// Tokens of all active rentals.
    async fn find_active_tokens(&self) -> AppResult<Vec<AccessToken>>;

    /// Debit `new.cost` from the holder and insert the row, together or
    /// not at all. Also journals the debit.
    async fn admit(&self, new: NewRental) -> AppResult<AdmitOutcome>;

    /// Set the viewing mode if it is unset and the rental is live at `now`.
    async fn set_viewing_mode(
        &self,
        id: RentalId,
        mode: ViewingMode,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Rental>>;

    /// Raise stored progress to `percent` if higher. Only live rentals.
    async fn record_progress(
        &self,
        id: RentalId,
        percent: i16,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Rental>>;

    /// Flip `rewind_claimed` and credit the holder in one unit of work.
    async fn claim_rewind(
        &self,
        id: RentalId,
        threshold_percent: i16,
        reward: i64,
    ) -> AppResult<ClaimOutcome>;

    /// Set `return_requested` on a live rental. `Some` only on the first
    /// transition.
    async fn mark_return_requested(
        &self,
        id: RentalId,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Rental>>;

    /// End an active rental and clear its token. `Some` only if this
    /// call did the flip.
    async fn deactivate(
        &self,
        id: RentalId,
        reason: RentalEndReason,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Rental>>;
}

/// Per-user credit balances.
#[async_trait]
pub trait CreditLedger: Send + Sync + std::fmt::Debug + 'static {
    /// Current balance. Unknown users have zero.
    async fn balance(&self, user_id: UserId) -> AppResult<i64>;

    /// Debit if the balance covers `amount`.
    async fn debit(
        &self,
        user_id: UserId,
        amount: i64,
        reason: CreditReason,
        rental_id: Option<RentalId>,
    ) -> AppResult<DebitOutcome>;

    /// Add `amount`, creating the account if needed. Returns the new balance.
    async fn credit(
        &self,
        user_id: UserId,
        amount: i64,
        reason: CreditReason,
        rental_id: Option<RentalId>,
    ) -> AppResult<i64>;
}

/// Read-only catalog lookup.
#[async_trait]
pub trait Catalog: Send + Sync + std::fmt::Debug + 'static {
    /// Fetch a film's availability and assets.
    async fn get_film(&self, film_id: FilmId) -> AppResult<Option<FilmListing>>;
}

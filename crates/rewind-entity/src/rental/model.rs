//! Rental entity model.

use chrono::{DateTime, Utc};
use rewind_core::types::{AccessToken, FilmId, RentalId, UserId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::mode::{RentalEndReason, ViewingMode};
use super::tier::RentalTier;

/// One user's time-boxed grant on one film. Rows are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Rental {
    /// Unique rental identifier.
    pub id: RentalId,
    /// The holder.
    pub user_id: UserId,
    /// The title rented.
    pub film_id: FilmId,
    /// Name of the live access point. `None` once the rental has ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<AccessToken>,
    /// When the rental was admitted.
    pub rented_at: DateTime<Utc>,
    /// When access ends.
    pub expires_at: DateTime<Utc>,
    /// Whether the rental currently grants access.
    pub is_active: bool,
    /// One-shot viewing mode choice.
    pub viewing_mode: ViewingMode,
    /// Highest watch progress reported, 0 to 100.
    pub watch_progress_percent: i16,
    /// Whether the rewind reward has been paid.
    pub rewind_claimed: bool,
    /// Courtesy flag set by the holder.
    pub return_requested: bool,
    /// Tier at admission time.
    pub tier: RentalTier,
    /// Credits debited at admission.
    pub cost: i64,
    /// When the rental stopped being active.
    pub ended_at: Option<DateTime<Utc>>,
    /// Why the rental stopped being active.
    pub end_reason: Option<RentalEndReason>,
}

impl Rental {
    /// Whether the rental grants access at `now`.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }

    /// Whether the rental grants access right now.
    pub fn is_live(&self) -> bool {
        self.is_live_at(Utc::now())
    }

    /// Active but past its deadline: the sweep's work list.
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at <= now
    }

    /// Check if `user_id` holds this rental.
    pub fn is_held_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }
}

/// Data required to admit a new rental.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRental {
    /// Pre-assigned rental id.
    pub id: RentalId,
    /// The holder.
    pub user_id: UserId,
    /// The title.
    pub film_id: FilmId,
    /// Token of the access point already granted.
    pub access_token: AccessToken,
    /// Admission time.
    pub rented_at: DateTime<Utc>,
    /// `rented_at` plus the tier duration.
    pub expires_at: DateTime<Utc>,
    /// Tier the title was classified as.
    pub tier: RentalTier,
    /// Credits to debit.
    pub cost: i64,
}

impl NewRental {
    /// The row as it looks right after insertion.
    pub fn into_rental(self) -> Rental {
        Rental {
            id: self.id,
            user_id: self.user_id,
            film_id: self.film_id,
            access_token: Some(self.access_token),
            rented_at: self.rented_at,
            expires_at: self.expires_at,
            is_active: true,
            viewing_mode: ViewingMode::Unset,
            watch_progress_percent: 0,
            rewind_claimed: false,
            return_requested: false,
            tier: self.tier,
            cost: self.cost,
            ended_at: None,
            end_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(expires_in: Duration) -> Rental {
        let now = Utc::now();
        NewRental {
            id: RentalId::new(),
            user_id: UserId::new(),
            film_id: FilmId::new(),
            access_token: AccessToken::new(),
            rented_at: now,
            expires_at: now + expires_in,
            tier: RentalTier::Standard,
            cost: 1,
        }
        .into_rental()
    }

    #[test]
    fn test_fresh_rental_is_live() {
        let rental = sample(Duration::hours(72));
        assert!(rental.is_live());
        assert!(!rental.is_stale_at(Utc::now()));
        assert_eq!(rental.viewing_mode, ViewingMode::Unset);
        assert!(rental.access_token.is_some());
    }

    #[test]
    fn test_past_deadline_is_stale_not_live() {
        let rental = sample(Duration::minutes(-1));
        let now = Utc::now();
        assert!(!rental.is_live_at(now));
        assert!(rental.is_stale_at(now));
    }

    #[test]
    fn test_ended_rental_is_neither() {
        let mut rental = sample(Duration::minutes(-1));
        rental.is_active = false;
        assert!(!rental.is_stale_at(Utc::now()));
        assert!(!rental.is_live());
    }
}

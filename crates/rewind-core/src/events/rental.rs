//! Rental lifecycle domain events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events related to the rental lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RentalEvent {
    /// A new rental was granted.
    Admitted {
        /// The rental ID.
        rental_id: Uuid,
        /// The film rented.
        film_id: Uuid,
        /// The holder.
        user_id: Uuid,
        /// Credits debited.
        cost: i64,
        /// When access ends.
        expires_at: DateTime<Utc>,
    },
    /// The holder picked how they will watch.
    ViewingModeSelected {
        /// The rental ID.
        rental_id: Uuid,
        /// `in_store` or `take_away`.
        mode: String,
    },
    /// The one-time rewind reward was paid out.
    RewardClaimed {
        /// The rental ID.
        rental_id: Uuid,
        /// The holder credited.
        user_id: Uuid,
        /// Credits granted.
        credits: i64,
    },
    /// The holder signalled they are done early. Operators act on this.
    ReturnRequested {
        /// The rental ID.
        rental_id: Uuid,
        /// The film to collect.
        film_id: Uuid,
        /// The holder.
        user_id: Uuid,
    },
    /// The holder ended the rental early.
    Returned {
        /// The rental ID.
        rental_id: Uuid,
        /// The film freed.
        film_id: Uuid,
    },
    /// The expiry sweep retired the rental.
    Expired {
        /// The rental ID.
        rental_id: Uuid,
        /// The film freed.
        film_id: Uuid,
    },
    /// An operator ended the rental.
    ForceEnded {
        /// The rental ID.
        rental_id: Uuid,
        /// The film freed.
        film_id: Uuid,
        /// Operator-supplied reason.
        reason: String,
    },
}

impl RentalEvent {
    /// The rental this event concerns.
    pub fn rental_id(&self) -> Uuid {
        match self {
            Self::Admitted { rental_id, .. }
            | Self::ViewingModeSelected { rental_id, .. }
            | Self::RewardClaimed { rental_id, .. }
            | Self::ReturnRequested { rental_id, .. }
            | Self::Returned { rental_id, .. }
            | Self::Expired { rental_id, .. }
            | Self::ForceEnded { rental_id, .. } => *rental_id,
        }
    }
}

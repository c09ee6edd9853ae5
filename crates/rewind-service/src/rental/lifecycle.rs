//! Post-admission rental state machine.
//!
//! ```text
//! Active/unset --set_viewing_mode--> Active/in_store | Active/take_away
//!      |                                   |
//!      +---- sweep, return_early, force_end ----> Ended
//! ```
//!
//! Checks run in a fixed order: existence, holder, activity, then the
//! operation's own one-shot rule.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use rewind_core::config::RentalConfig;
use rewind_core::events::RentalEvent;
use rewind_core::traits::AccessProvisioner;
use rewind_core::types::{RentalId, UserId};
use rewind_database::store::{ClaimOutcome, RentalStore};
use rewind_entity::rental::{Rental, RentalEndReason, ViewingMode};

use super::error::RentalError;
use super::events::EventBus;
use super::teardown::end_rental;

/// A viewing mode the holder can pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewingChoice {
    /// Stream in the storefront.
    InStore,
    /// Download the full file.
    TakeAway,
}

impl From<ViewingChoice> for ViewingMode {
    fn from(choice: ViewingChoice) -> Self {
        match choice {
            ViewingChoice::InStore => ViewingMode::InStore,
            ViewingChoice::TakeAway => ViewingMode::TakeAway,
        }
    }
}

/// Holder-driven transitions plus the early-return and operator paths.
#[derive(Clone)]
pub struct RentalStateMachine {
    store: Arc<dyn RentalStore>,
    provisioner: Arc<dyn AccessProvisioner>,
    events: EventBus,
    config: RentalConfig,
}

impl std::fmt::Debug for RentalStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RentalStateMachine").finish()
    }
}

impl RentalStateMachine {
    /// Creates a new state machine.
    pub fn new(
        store: Arc<dyn RentalStore>,
        provisioner: Arc<dyn AccessProvisioner>,
        events: EventBus,
        config: RentalConfig,
    ) -> Self {
        Self {
            store,
            provisioner,
            events,
            config,
        }
    }

    async fn load(&self, id: RentalId) -> Result<Rental, RentalError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(RentalError::NotFound)
    }

    async fn load_for_holder(&self, id: RentalId, holder: UserId) -> Result<Rental, RentalError> {
        let rental = self.load(id).await?;
        if !rental.is_held_by(holder) {
            return Err(RentalError::Forbidden);
        }
        Ok(rental)
    }

    async fn load_live_for_holder(
        &self,
        id: RentalId,
        holder: UserId,
    ) -> Result<Rental, RentalError> {
        let rental = self.load_for_holder(id, holder).await?;
        if !rental.is_live_at(Utc::now()) {
            return Err(RentalError::NotActive);
        }
        Ok(rental)
    }

    /// Record the holder's one-time viewing mode choice.
    pub async fn set_viewing_mode(
        &self,
        id: RentalId,
        holder: UserId,
        choice: ViewingChoice,
    ) -> Result<Rental, RentalError> {
        let rental = self.load_live_for_holder(id, holder).await?;
        if rental.viewing_mode.is_set() {
            return Err(RentalError::AlreadySet);
        }

        let mode = ViewingMode::from(choice);
        let Some(updated) = self.store.set_viewing_mode(id, mode, Utc::now()).await? else {
            // lost a race: either someone else set it or the rental just ended
            let current = self.load(id).await?;
            return Err(if current.is_live_at(Utc::now()) {
                RentalError::AlreadySet
            } else {
                RentalError::NotActive
            });
        };

        info!(rental_id = %id, mode = %mode, "Viewing mode selected");
        self.events.publish(
            Some(holder.into_uuid()),
            RentalEvent::ViewingModeSelected {
                rental_id: id.into_uuid(),
                mode: mode.to_string(),
            },
        );
        Ok(updated)
    }

    /// Raise watch progress. Lower values than stored are ignored.
    pub async fn record_progress(
        &self,
        id: RentalId,
        holder: UserId,
        percent: i16,
    ) -> Result<Rental, RentalError> {
        self.load_live_for_holder(id, holder).await?;
        self.store
            .record_progress(id, percent.clamp(0, 100), Utc::now())
            .await?
            .ok_or(RentalError::NotActive)
    }

    /// Pay the one-time rewind reward.
    ///
    /// Allowed after the rental ended, as long as it was earned.
    pub async fn claim_rewind_reward(
        &self,
        id: RentalId,
        holder: UserId,
    ) -> Result<Rental, RentalError> {
        let rental = self.load_for_holder(id, holder).await?;
        if rental.rewind_claimed {
            return Err(RentalError::AlreadyClaimed);
        }

        let threshold = self.config.rewind_threshold_percent;
        let reward = self.config.rewind_reward_credits;
        match self.store.claim_rewind(id, threshold, reward).await? {
            ClaimOutcome::Claimed(rental) => {
                info!(rental_id = %id, user_id = %holder, credits = reward, "Rewind reward claimed");
                self.events.publish(
                    Some(holder.into_uuid()),
                    RentalEvent::RewardClaimed {
                        rental_id: id.into_uuid(),
                        user_id: holder.into_uuid(),
                        credits: reward,
                    },
                );
                Ok(rental)
            }
            ClaimOutcome::AlreadyClaimed => Err(RentalError::AlreadyClaimed),
            ClaimOutcome::NotEligible { progress } => Err(RentalError::NotEligible {
                progress,
                threshold,
            }),
        }
    }

    /// Flag that the holder is done early. Operators are notified once.
    pub async fn request_return(&self, id: RentalId, holder: UserId) -> Result<Rental, RentalError> {
        let rental = self.load_live_for_holder(id, holder).await?;
        if rental.return_requested {
            return Ok(rental);
        }

        match self.store.mark_return_requested(id, Utc::now()).await? {
            Some(updated) => {
                info!(rental_id = %id, film_id = %updated.film_id, "Return requested");
                self.events.publish(
                    Some(holder.into_uuid()),
                    RentalEvent::ReturnRequested {
                        rental_id: id.into_uuid(),
                        film_id: updated.film_id.into_uuid(),
                        user_id: holder.into_uuid(),
                    },
                );
                Ok(updated)
            }
            None => {
                let current = self.load(id).await?;
                if current.is_live_at(Utc::now()) && current.return_requested {
                    Ok(current)
                } else {
                    Err(RentalError::NotActive)
                }
            }
        }
    }

    /// End the rental now on the holder's behalf.
    pub async fn return_early(&self, id: RentalId, holder: UserId) -> Result<Rental, RentalError> {
        let rental = self.load_live_for_holder(id, holder).await?;
        let ended = end_rental(
            self.store.as_ref(),
            self.provisioner.as_ref(),
            &rental,
            RentalEndReason::Returned,
            Utc::now(),
        )
        .await?
        .ok_or(RentalError::NotActive)?;

        info!(rental_id = %id, film_id = %ended.film_id, "Rental returned early");
        self.events.publish(
            Some(holder.into_uuid()),
            RentalEvent::Returned {
                rental_id: id.into_uuid(),
                film_id: ended.film_id.into_uuid(),
            },
        );
        Ok(ended)
    }

    /// Operator path: end any active rental, expired or not.
    pub async fn force_end(&self, id: RentalId, reason: &str) -> Result<Rental, RentalError> {
        let rental = self.load(id).await?;
        if !rental.is_active {
            return Err(RentalError::NotActive);
        }
        let ended = end_rental(
            self.store.as_ref(),
            self.provisioner.as_ref(),
            &rental,
            RentalEndReason::ForceEnded,
            Utc::now(),
        )
        .await?
        .ok_or(RentalError::NotActive)?;

        info!(rental_id = %id, film_id = %ended.film_id, reason, "Rental force-ended");
        self.events.publish(
            None,
            RentalEvent::ForceEnded {
                rental_id: id.into_uuid(),
                film_id: ended.film_id.into_uuid(),
                reason: reason.to_string(),
            },
        );
        Ok(ended)
    }
}

//! Admission controller: the entry point for starting a rental.

use std::sync::Arc;

use chrono::{Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use rewind_core::AppError;
use rewind_core::config::RentalConfig;
use rewind_core::events::RentalEvent;
use rewind_core::traits::{AccessProvisioner, StreamingUrl};
use rewind_core::types::{AccessToken, FilmId, RentalId, UserId};
use rewind_database::store::{AdmitOutcome, Catalog, CreditLedger, RentalStore};
use rewind_entity::rental::{NewRental, Rental, RentalTier};

use super::error::RentalError;
use super::events::EventBus;

/// A rental together with the URLs its holder streams from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalGrant {
    /// The rental row.
    pub rental: Rental,
    /// One URL per asset the title has.
    pub streaming_urls: Vec<StreamingUrl>,
}

/// Grants new rentals.
#[derive(Clone)]
pub struct AdmissionController {
    store: Arc<dyn RentalStore>,
    ledger: Arc<dyn CreditLedger>,
    catalog: Arc<dyn Catalog>,
    provisioner: Arc<dyn AccessProvisioner>,
    events: EventBus,
    config: RentalConfig,
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("provisioner", &self.provisioner.provider_type())
            .finish()
    }
}

impl AdmissionController {
    /// Creates a new admission controller.
    pub fn new(
        store: Arc<dyn RentalStore>,
        ledger: Arc<dyn CreditLedger>,
        catalog: Arc<dyn Catalog>,
        provisioner: Arc<dyn AccessProvisioner>,
        events: EventBus,
        config: RentalConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            catalog,
            provisioner,
            events,
            config,
        }
    }

    /// Start a rental of `film_id` for `user_id`, or hand back the one the
    /// user already holds.
    pub async fn request_rental(
        &self,
        user_id: UserId,
        film_id: FilmId,
    ) -> Result<RentalGrant, RentalError> {
        let film = self
            .catalog
            .get_film(film_id)
            .await?
            .filter(|f| f.is_available)
            .ok_or(RentalError::NotAvailable)?;
        let assets = film.assets();
        if assets.is_empty() {
            warn!(film_id = %film_id, "Available film has no media assets");
            return Err(RentalError::NotAvailable);
        }

        if let Some(held) = self.store.find_active_by_film(film_id).await? {
            return self.existing_or_conflict(held, user_id).await;
        }

        let now = Utc::now();
        let tier = RentalTier::classify(film.release_year, now.year(), &self.config);
        let terms = tier.terms(&self.config);

        let balance = self.ledger.balance(user_id).await?;
        if balance < terms.cost {
            return Err(RentalError::InsufficientCredits {
                required: terms.cost,
                balance,
            });
        }

        let expires_at = Duration::try_hours(terms.duration_hours)
            .and_then(|window| now.checked_add_signed(window))
            .ok_or_else(|| {
                AppError::configuration(format!(
                    "{tier} rental window of {} hours is out of range",
                    terms.duration_hours
                ))
            })?;

        let token = AccessToken::new();
        let streaming_urls = self
            .provisioner
            .grant(&token, &assets)
            .await
            .map_err(|e| {
                warn!(film_id = %film_id, error = %e, "Access point grant failed");
                RentalError::ProvisionFailure(e)
            })?;

        let new = NewRental {
            id: RentalId::new(),
            user_id,
            film_id,
            access_token: token,
            rented_at: now,
            expires_at,
            tier,
            cost: terms.cost,
        };

        let outcome = match self.store.admit(new).await {
            Ok(outcome) => outcome,
            Err(e) => {
                return Err(match self.compensate(&token).await {
                    Ok(()) => RentalError::Internal(e),
                    Err(revoke_err) => {
                        error!(
                            alert = true,
                            user_id = %user_id,
                            film_id = %film_id,
                            token = %token.short(),
                            store_error = %e,
                            revoke_error = %revoke_err,
                            "Admission failed and its access point could not be revoked"
                        );
                        RentalError::ProvisionFailure(revoke_err)
                    }
                });
            }
        };

        match outcome {
            AdmitOutcome::Granted(rental) => {
                info!(
                    rental_id = %rental.id,
                    user_id = %user_id,
                    film_id = %film_id,
                    tier = %tier,
                    cost = terms.cost,
                    token = %token.short(),
                    expires_at = %rental.expires_at,
                    "Rental admitted"
                );
                self.events.publish(
                    Some(user_id.into_uuid()),
                    RentalEvent::Admitted {
                        rental_id: rental.id.into_uuid(),
                        film_id: film_id.into_uuid(),
                        user_id: user_id.into_uuid(),
                        cost: rental.cost,
                        expires_at: rental.expires_at,
                    },
                );
                Ok(RentalGrant {
                    rental,
                    streaming_urls,
                })
            }
            AdmitOutcome::Existing(held) => {
                self.compensate_quietly(&token).await;
                self.existing_or_conflict(held, user_id).await
            }
            AdmitOutcome::HeldByOther => {
                self.compensate_quietly(&token).await;
                Err(RentalError::AlreadyRented)
            }
            AdmitOutcome::InsufficientCredits { balance } => {
                self.compensate_quietly(&token).await;
                Err(RentalError::InsufficientCredits {
                    required: terms.cost,
                    balance,
                })
            }
        }
    }

    /// Hand an active rental back to its holder with the URLs its access
    /// point actually serves, which may differ from the current catalog
    /// entry if the title's media changed after admission.
    async fn existing_or_conflict(
        &self,
        held: Rental,
        user_id: UserId,
    ) -> Result<RentalGrant, RentalError> {
        if !held.is_held_by(user_id) {
            return Err(RentalError::AlreadyRented);
        }
        let streaming_urls = match held.access_token {
            Some(token) => match self.provisioner.inspect(&token).await? {
                Some(point) => point.streaming_urls,
                None => {
                    error!(
                        alert = true,
                        rental_id = %held.id,
                        token = %token.short(),
                        "Active rental has no access point"
                    );
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        Ok(RentalGrant {
            rental: held,
            streaming_urls,
        })
    }

    async fn compensate(&self, token: &AccessToken) -> Result<(), AppError> {
        self.provisioner.revoke(token).await
    }

    /// Revoke after an expected refusal. A failure here leaves an orphaned
    /// access point that access recovery removes later.
    async fn compensate_quietly(&self, token: &AccessToken) {
        if let Err(e) = self.compensate(token).await {
            error!(
                alert = true,
                token = %token.short(),
                error = %e,
                "Could not revoke access point of a refused admission"
            );
        }
    }
}

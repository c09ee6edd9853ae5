//! Rental lifecycle and secure streaming access.

pub mod admission;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod reconciler;
mod teardown;

pub use admission::{AdmissionController, RentalGrant};
pub use error::RentalError;
pub use events::EventBus;
pub use lifecycle::{RentalStateMachine, ViewingChoice};
pub use reconciler::{AccessRecovery, ExpiryReconciler, RecoveryReport, SweepReport};

use std::sync::Arc;

use rewind_core::config::RentalConfig;
use rewind_core::traits::AccessProvisioner;
use rewind_core::types::{FilmId, RentalId, UserId};
use rewind_database::store::{Catalog, CreditLedger, RentalFilter, RentalStore};
use rewind_entity::rental::Rental;

/// Everything the engine offers, wired from one set of collaborators.
#[derive(Debug, Clone)]
pub struct RentalService {
    store: Arc<dyn RentalStore>,
    admission: AdmissionController,
    lifecycle: RentalStateMachine,
    expiry: ExpiryReconciler,
    recovery: AccessRecovery,
    events: EventBus,
}

impl RentalService {
    /// Creates a new rental service.
    pub fn new(
        store: Arc<dyn RentalStore>,
        ledger: Arc<dyn CreditLedger>,
        catalog: Arc<dyn Catalog>,
        provisioner: Arc<dyn AccessProvisioner>,
        config: RentalConfig,
        events: EventBus,
    ) -> Self {
        let grace = config.orphan_grace();
        Self {
            admission: AdmissionController::new(
                Arc::clone(&store),
                ledger,
                catalog,
                Arc::clone(&provisioner),
                events.clone(),
                config.clone(),
            ),
            lifecycle: RentalStateMachine::new(
                Arc::clone(&store),
                Arc::clone(&provisioner),
                events.clone(),
                config,
            ),
            expiry: ExpiryReconciler::new(
                Arc::clone(&store),
                Arc::clone(&provisioner),
                events.clone(),
            ),
            recovery: AccessRecovery::new(Arc::clone(&store), provisioner, grace),
            store,
            events,
        }
    }

    /// Start (or re-enter) a rental.
    pub async fn request_rental(
        &self,
        user_id: UserId,
        film_id: FilmId,
    ) -> Result<RentalGrant, RentalError> {
        self.admission.request_rental(user_id, film_id).await
    }

    /// See [`RentalStateMachine::set_viewing_mode`].
    pub async fn set_viewing_mode(
        &self,
        id: RentalId,
        holder: UserId,
        choice: ViewingChoice,
    ) -> Result<Rental, RentalError> {
        self.lifecycle.set_viewing_mode(id, holder, choice).await
    }

    /// See [`RentalStateMachine::record_progress`].
    pub async fn record_progress(
        &self,
        id: RentalId,
        holder: UserId,
        percent: i16,
    ) -> Result<Rental, RentalError> {
        self.lifecycle.record_progress(id, holder, percent).await
    }

    /// See [`RentalStateMachine::claim_rewind_reward`].
    pub async fn claim_rewind_reward(
        &self,
        id: RentalId,
        holder: UserId,
    ) -> Result<Rental, RentalError> {
        self.lifecycle.claim_rewind_reward(id, holder).await
    }

    /// See [`RentalStateMachine::request_return`].
    pub async fn request_return(&self, id: RentalId, holder: UserId) -> Result<Rental, RentalError> {
        self.lifecycle.request_return(id, holder).await
    }

    /// See [`RentalStateMachine::return_early`].
    pub async fn return_early(&self, id: RentalId, holder: UserId) -> Result<Rental, RentalError> {
        self.lifecycle.return_early(id, holder).await
    }

    /// See [`RentalStateMachine::force_end`].
    pub async fn force_end(&self, id: RentalId, reason: &str) -> Result<Rental, RentalError> {
        self.lifecycle.force_end(id, reason).await
    }

    /// The active rental for a film, if any.
    pub async fn active_rental_for_film(
        &self,
        film_id: FilmId,
    ) -> Result<Option<Rental>, RentalError> {
        Ok(self.store.find_active_by_film(film_id).await?)
    }

    /// A holder's active rentals, newest first.
    pub async fn active_rentals_for_holder(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Rental>, RentalError> {
        Ok(self.store.find_active_by_user(user_id).await?)
    }

    /// Every rental a holder ever had, newest first.
    pub async fn history_for_holder(&self, user_id: UserId) -> Result<Vec<Rental>, RentalError> {
        Ok(self.store.find_by_user(user_id).await?)
    }

    /// Fetch one rental.
    pub async fn get(&self, id: RentalId) -> Result<Rental, RentalError> {
        self.store.find_by_id(id).await?.ok_or(RentalError::NotFound)
    }

    /// Operator listing.
    pub async fn list(&self, filter: &RentalFilter) -> Result<Vec<Rental>, RentalError> {
        Ok(self.store.list(filter).await?)
    }

    /// The expiry sweep, for the scheduler and the CLI.
    pub fn expiry(&self) -> &ExpiryReconciler {
        &self.expiry
    }

    /// The orphaned access point audit.
    pub fn recovery(&self) -> &AccessRecovery {
        &self.recovery
    }

    /// The event bus operations publish on.
    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

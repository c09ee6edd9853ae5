//! The single routine that ends a rental.

use chrono::{DateTime, Utc};
use tracing::debug;

use rewind_core::result::AppResult;
use rewind_core::traits::AccessProvisioner;
use rewind_database::store::RentalStore;
use rewind_entity::rental::{Rental, RentalEndReason};

/// Revoke the access point, then deactivate the row.
///
/// Revoking first means a crash in between leaves a row that is active but
/// already unreachable, which the next run repeats harmlessly. Returns
/// `None` if the row was already inactive when the update ran.
pub(crate) async fn end_rental(
    store: &dyn RentalStore,
    provisioner: &dyn AccessProvisioner,
    rental: &Rental,
    reason: RentalEndReason,
    now: DateTime<Utc>,
) -> AppResult<Option<Rental>> {
    if let Some(token) = &rental.access_token {
        provisioner.revoke(token).await?;
        debug!(rental_id = %rental.id, token = %token.short(), "Access point revoked");
    }
    store.deactivate(rental.id, reason, now).await
}

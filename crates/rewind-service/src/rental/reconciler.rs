//! Expiry sweep and orphaned access point recovery.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use rewind_core::events::RentalEvent;
use rewind_core::result::AppResult;
use rewind_core::traits::AccessProvisioner;
use rewind_core::types::AccessToken;
use rewind_database::store::RentalStore;
use rewind_entity::rental::RentalEndReason;

use super::events::EventBus;
use super::teardown::end_rental;

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Stale rows found.
    pub examined: usize,
    /// Rows this run deactivated.
    pub expired: usize,
    /// Rows that failed and stay for the next run.
    pub failed: usize,
}

/// Retires active rentals whose deadline has passed.
///
/// Safe to run concurrently with itself: revoke is idempotent and the
/// deactivation only matches rows that are still active.
#[derive(Clone)]
pub struct ExpiryReconciler {
    store: Arc<dyn RentalStore>,
    provisioner: Arc<dyn AccessProvisioner>,
    events: EventBus,
}

impl std::fmt::Debug for ExpiryReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryReconciler").finish()
    }
}

impl ExpiryReconciler {
    /// Creates a new expiry reconciler.
    pub fn new(
        store: Arc<dyn RentalStore>,
        provisioner: Arc<dyn AccessProvisioner>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            provisioner,
            events,
        }
    }

    /// Sweep as of the current time.
    pub async fn sweep(&self) -> AppResult<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep every rental stale as of `now`. One failing row does not
    /// stop the rest.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let stale = self.store.find_stale(now).await?;
        let mut report = SweepReport {
            examined: stale.len(),
            ..Default::default()
        };

        for rental in &stale {
            match end_rental(
                self.store.as_ref(),
                self.provisioner.as_ref(),
                rental,
                RentalEndReason::Expired,
                now,
            )
            .await
            {
                Ok(Some(ended)) => {
                    report.expired += 1;
                    self.events.publish(
                        None,
                        RentalEvent::Expired {
                            rental_id: ended.id.into_uuid(),
                            film_id: ended.film_id.into_uuid(),
                        },
                    );
                }
                // a concurrent sweep or return got there first
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(rental_id = %rental.id, error = %e, "Failed to expire rental");
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                expired = report.expired,
                failed = report.failed,
                "Expiry sweep completed"
            );
        }
        Ok(report)
    }
}

/// Outcome of an access point audit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Access points backed by an active rental.
    pub live: usize,
    /// Access points with no active rental.
    pub orphaned: usize,
    /// Orphans revoked this run.
    pub revoked: usize,
    /// Orphans left for a later run: still inside the grace window, or
    /// seen for the first time by the audit.
    pub pending: usize,
    /// Orphans whose revoke failed.
    pub failed: usize,
}

/// Orphans found by one listing pass.
#[derive(Debug, Default)]
struct Survey {
    live: usize,
    /// Older than the grace window.
    settled: Vec<AccessToken>,
    /// Still inside the grace window.
    young: Vec<AccessToken>,
    failed: usize,
}

/// Removes access points that no active rental owns.
///
/// Debit and insert commit together, so the only residue a crash can leave
/// is an access point granted for an admission that never committed. An
/// admission in flight looks exactly like that residue until it commits,
/// so an orphan is only revoked once it is older than the grace window.
#[derive(Clone)]
pub struct AccessRecovery {
    store: Arc<dyn RentalStore>,
    provisioner: Arc<dyn AccessProvisioner>,
    grace: Duration,
    suspects: Arc<Mutex<HashSet<AccessToken>>>,
}

impl std::fmt::Debug for AccessRecovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessRecovery")
            .field("grace", &self.grace)
            .finish()
    }
}

impl AccessRecovery {
    /// Creates a new recovery pass with the given orphan grace window.
    pub fn new(
        store: Arc<dyn RentalStore>,
        provisioner: Arc<dyn AccessProvisioner>,
        grace: Duration,
    ) -> Self {
        Self {
            store,
            provisioner,
            grace,
            suspects: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    async fn survey(&self, now: DateTime<Utc>) -> AppResult<Survey> {
        // list access points before rentals so a grant that commits in
        // between is seen as live
        let tokens = self.provisioner.tokens().await?;
        let active: HashSet<AccessToken> =
            self.store.find_active_tokens().await?.into_iter().collect();
        let cutoff = now - self.grace;

        let mut survey = Survey::default();
        for token in tokens {
            if active.contains(&token) {
                survey.live += 1;
                continue;
            }
            match self.provisioner.inspect(&token).await {
                Ok(Some(point)) if point.granted_at <= cutoff => survey.settled.push(token),
                Ok(Some(_)) => survey.young.push(token),
                // revoked between listing and inspection
                Ok(None) => {}
                Err(e) => {
                    survey.failed += 1;
                    warn!(token = %token.short(), error = %e, "Failed to inspect access point");
                }
            }
        }
        Ok(survey)
    }

    async fn revoke_all(&self, report: &mut RecoveryReport, orphans: &[AccessToken]) {
        for token in orphans {
            match self.provisioner.revoke(token).await {
                Ok(()) => report.revoked += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(token = %token.short(), error = %e, "Failed to revoke orphaned access point");
                }
            }
        }
        if report.orphaned > 0 {
            info!(
                live = report.live,
                orphaned = report.orphaned,
                revoked = report.revoked,
                pending = report.pending,
                failed = report.failed,
                "Orphaned access points reconciled"
            );
        }
    }

    /// Revoke every orphan older than the grace window.
    ///
    /// Used at startup and by the operator CLI. Safe while other processes
    /// are admitting rentals, as long as an admission commits within the
    /// grace window.
    pub async fn reconcile(&self) -> AppResult<RecoveryReport> {
        self.reconcile_at(Utc::now()).await
    }

    /// [`reconcile`](Self::reconcile) against an explicit clock.
    pub async fn reconcile_at(&self, now: DateTime<Utc>) -> AppResult<RecoveryReport> {
        let survey = self.survey(now).await?;
        let mut report = RecoveryReport {
            live: survey.live,
            orphaned: survey.settled.len() + survey.young.len(),
            pending: survey.young.len(),
            failed: survey.failed,
            ..Default::default()
        };
        self.revoke_all(&mut report, &survey.settled).await;
        Ok(report)
    }

    /// Periodic variant: revoke only settled orphans that were already
    /// orphaned on the previous audit.
    pub async fn audit(&self) -> AppResult<RecoveryReport> {
        let survey = self.survey(Utc::now()).await?;
        let mut suspects = self.suspects.lock().await;
        let (confirmed, fresh): (Vec<_>, Vec<_>) = survey
            .settled
            .into_iter()
            .partition(|t| suspects.contains(t));
        *suspects = fresh
            .iter()
            .chain(survey.young.iter())
            .copied()
            .collect();
        drop(suspects);

        let mut report = RecoveryReport {
            live: survey.live,
            orphaned: confirmed.len() + fresh.len() + survey.young.len(),
            pending: fresh.len() + survey.young.len(),
            failed: survey.failed,
            ..Default::default()
        };
        self.revoke_all(&mut report, &confirmed).await;
        Ok(report)
    }
}

//! # rewind-service
//!
//! The rental engine: admission control, the post-admission state machine,
//! the expiry reconciler, and startup access recovery.
//!
//! Services follow constructor injection. Storage, ledger, catalog, and
//! provisioner are passed in as `Arc<dyn Trait>` so the same engine runs
//! against PostgreSQL or the in-memory store.

pub mod rental;

pub use rental::{
    AccessRecovery, AdmissionController, EventBus, ExpiryReconciler, RecoveryReport, RentalError,
    RentalGrant, RentalService, RentalStateMachine, SweepReport, ViewingChoice,
};

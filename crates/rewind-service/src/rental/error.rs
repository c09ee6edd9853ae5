//! Typed outcomes of rental operations.

use rewind_core::error::{AppError, ErrorKind};
use thiserror::Error;

/// Every way a rental operation can be refused or fail.
#[derive(Debug, Error)]
pub enum RentalError {
    /// The title is unknown, withdrawn, or has nothing to stream.
    #[error("This film is not available for rent")]
    NotAvailable,
    /// Another user holds the only copy.
    #[error("This film is currently rented by someone else")]
    AlreadyRented,
    /// Balance below the tier cost.
    #[error("Not enough credits: {required} needed, {balance} available")]
    InsufficientCredits {
        /// Tier cost.
        required: i64,
        /// Balance at the time of the check.
        balance: i64,
    },
    /// Caller is not the holder.
    #[error("Only the holder of this rental can do that")]
    Forbidden,
    /// Rental expired or was ended.
    #[error("This rental has ended")]
    NotActive,
    /// Viewing mode was already chosen.
    #[error("A viewing mode has already been chosen for this rental")]
    AlreadySet,
    /// Rewind reward was already paid.
    #[error("The rewind reward for this rental has already been claimed")]
    AlreadyClaimed,
    /// Watch progress below the reward threshold.
    #[error("Watch at least {threshold}% to claim the rewind reward (currently {progress}%)")]
    NotEligible {
        /// Stored progress.
        progress: i16,
        /// Required progress.
        threshold: i16,
    },
    /// Access point could not be created, or a failed admission could not
    /// be cleaned up.
    #[error("Streaming access could not be provisioned")]
    ProvisionFailure(#[source] AppError),
    /// Unknown rental id.
    #[error("Rental not found")]
    NotFound,
    /// Store, ledger, or catalog failure.
    #[error(transparent)]
    Internal(#[from] AppError),
}

impl RentalError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAvailable => "NOT_AVAILABLE",
            Self::AlreadyRented => "ALREADY_RENTED",
            Self::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS",
            Self::Forbidden => "FORBIDDEN",
            Self::NotActive => "NOT_ACTIVE",
            Self::AlreadySet => "ALREADY_SET",
            Self::AlreadyClaimed => "ALREADY_CLAIMED",
            Self::NotEligible { .. } => "NOT_ELIGIBLE",
            Self::ProvisionFailure(_) => "PROVISION_FAILURE",
            Self::NotFound => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the caller can act on this outcome (as opposed to an
    /// infrastructure failure).
    pub fn is_expected(&self) -> bool {
        !matches!(self, Self::ProvisionFailure(_) | Self::Internal(_))
    }

    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAvailable
            | Self::AlreadyRented
            | Self::NotActive
            | Self::AlreadySet
            | Self::AlreadyClaimed => ErrorKind::Conflict,
            Self::InsufficientCredits { .. } => ErrorKind::PaymentRequired,
            Self::Forbidden => ErrorKind::Authorization,
            Self::NotEligible { .. } => ErrorKind::Validation,
            Self::ProvisionFailure(_) => ErrorKind::Storage,
            Self::NotFound => ErrorKind::NotFound,
            Self::Internal(e) => e.kind,
        }
    }
}

impl From<RentalError> for AppError {
    fn from(err: RentalError) -> Self {
        match err {
            RentalError::Internal(inner) => inner,
            RentalError::ProvisionFailure(inner) => AppError::with_source(
                ErrorKind::Storage,
                "[PROVISION_FAILURE] Streaming access could not be provisioned",
                inner,
            ),
            other => AppError::new(other.kind(), format!("[{}] {other}", other.code())),
        }
    }
}

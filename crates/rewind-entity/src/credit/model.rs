//! Credit account and journal models.

use chrono::{DateTime, Utc};
use rewind_core::types::{CreditTransactionId, RentalId, UserId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Why a ledger entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "credit_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CreditReason {
    /// Debit for admitting a rental.
    Rental,
    /// One-time reward for finishing a rental.
    RewindReward,
    /// Manual or external adjustment.
    Adjustment,
}

impl CreditReason {
    /// Return the reason as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rental => "rental",
            Self::RewindReward => "rewind_reward",
            Self::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for CreditReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-user credit balance. Never negative.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CreditAccount {
    /// Account owner.
    pub user_id: UserId,
    /// Current balance.
    pub balance: i64,
    /// Last balance change.
    pub updated_at: DateTime<Utc>,
}

/// Journal entry for one balance change.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CreditTransaction {
    /// Entry identifier.
    pub id: CreditTransactionId,
    /// Account owner.
    pub user_id: UserId,
    /// Signed amount; debits are negative.
    pub amount: i64,
    /// Why the balance changed.
    pub reason: CreditReason,
    /// Rental the change relates to, if any.
    pub rental_id: Option<RentalId>,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

//! Credit ledger repository.
//!
//! Every balance change is journaled in `credit_transactions` inside the
//! same transaction as the change itself.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use rewind_core::error::AppError;
use rewind_core::result::AppResult;
use rewind_core::types::{CreditTransactionId, RentalId, UserId};
use rewind_entity::credit::{CreditReason, CreditTransaction};

use super::db_error;
use crate::store::{CreditLedger, DebitOutcome};

/// PostgreSQL-backed credit ledger.
#[derive(Debug, Clone)]
pub struct PgCreditLedger {
    pool: PgPool,
}

impl PgCreditLedger {
    /// Create a new ledger repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Journal entries for a user, newest first.
    pub async fn history(&self, user_id: UserId, limit: i64) -> AppResult<Vec<CreditTransaction>> {
        sqlx::query_as::<_, CreditTransaction>(
            "SELECT * FROM credit_transactions WHERE user_id = $1 \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load credit history", e))
    }
}

/// Conditionally debit inside an open transaction. `None` if the balance
/// does not cover `amount`.
pub(crate) async fn debit_in(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    amount: i64,
) -> AppResult<Option<i64>> {
    sqlx::query_scalar::<_, i64>(
        "UPDATE credit_accounts SET balance = balance - $2, updated_at = NOW() \
         WHERE user_id = $1 AND balance >= $2 RETURNING balance",
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| db_error("Failed to debit credits", e))
}

/// Credit inside an open transaction, creating the account if needed.
pub(crate) async fn credit_in(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    amount: i64,
) -> AppResult<i64> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO credit_accounts (user_id, balance) VALUES ($1, $2) \
         ON CONFLICT (user_id) DO UPDATE \
         SET balance = credit_accounts.balance + EXCLUDED.balance, updated_at = NOW() \
         RETURNING balance",
    )
    .bind(user_id)
    .bind(amount)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| db_error("Failed to credit account", e))
}

/// Write one journal row inside an open transaction.
pub(crate) async fn journal_in(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    amount: i64,
    reason: CreditReason,
    rental_id: Option<RentalId>,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO credit_transactions (id, user_id, amount, reason, rental_id) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(CreditTransactionId::new())
    .bind(user_id)
    .bind(amount)
    .bind(reason)
    .bind(rental_id)
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error("Failed to journal credit change", e))?;
    Ok(())
}

/// Balance read inside an open transaction.
pub(crate) async fn balance_in(tx: &mut Transaction<'_, Postgres>, user_id: UserId) -> AppResult<i64> {
    let balance = sqlx::query_scalar::<_, i64>("SELECT balance FROM credit_accounts WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to read balance", e))?;
    Ok(balance.unwrap_or(0))
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    async fn balance(&self, user_id: UserId) -> AppResult<i64> {
        let balance = sqlx::query_scalar::<_, i64>(
            "SELECT balance FROM credit_accounts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to read balance", e))?;
        Ok(balance.unwrap_or(0))
    }

    async fn debit(
        &self,
        user_id: UserId,
        amount: i64,
        reason: CreditReason,
        rental_id: Option<RentalId>,
    ) -> AppResult<DebitOutcome> {
        if amount < 0 {
            return Err(AppError::validation("Debit amount must not be negative"));
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let Some(balance) = debit_in(&mut tx, user_id, amount).await? else {
            let balance = balance_in(&mut tx, user_id).await?;
            return Ok(DebitOutcome::Insufficient(balance));
        };
        if amount != 0 {
            journal_in(&mut tx, user_id, -amount, reason, rental_id).await?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit debit", e))?;
        Ok(DebitOutcome::Debited(balance))
    }

    async fn credit(
        &self,
        user_id: UserId,
        amount: i64,
        reason: CreditReason,
        rental_id: Option<RentalId>,
    ) -> AppResult<i64> {
        if amount < 0 {
            return Err(AppError::validation("Credit amount must not be negative"));
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let balance = credit_in(&mut tx, user_id, amount).await?;
        if amount != 0 {
            journal_in(&mut tx, user_id, amount, reason, rental_id).await?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit credit", e))?;
        Ok(balance)
    }
}

//! Points ledger operations for the repository.

use super::{insert_movement, is_unique_violation, movement_from_row, Repository};
use crate::domain::{Account, AccountId, LedgerMovement, MovementKind, OrderId, TimeMs};
use crate::store::{LedgerError, LedgerStore};
use async_trait::async_trait;
use sqlx::Row;
use tracing::debug;

fn duplicate_or_storage(err: sqlx::Error, order_id: &OrderId, kind: MovementKind) -> LedgerError {
    if is_unique_violation(&err) {
        LedgerError::DuplicateMovement {
            order_id: order_id.clone(),
            kind,
        }
    } else {
        LedgerError::Storage(err)
    }
}

#[async_trait]
impl LedgerStore for Repository {
    async fn get_account(&self, account_id: &AccountId) -> Result<Account, LedgerError> {
        let row = sqlx::query(
            "SELECT account_id, points, updated_at FROM accounts WHERE account_id = ?",
        )
        .bind(account_id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LedgerError::AccountNotFound(account_id.clone()))?;

        Ok(Account {
            account_id: AccountId::new(row.get::<String, _>("account_id")),
            balance: row.get("points"),
            updated_at: TimeMs::new(row.get("updated_at")),
        })
    }

    async fn debit(
        &self,
        account_id: &AccountId,
        amount: i64,
        order_id: &OrderId,
    ) -> Result<LedgerMovement, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let now = TimeMs::now();
        let mut tx = self.pool.begin().await?;

        // Check and mutate in one statement.
        let updated = sqlx::query(
            r#"
            UPDATE accounts SET points = points - ?, updated_at = ?
            WHERE account_id = ? AND points >= ?
            "#,
        )
        .bind(amount)
        .bind(now.as_ms())
        .bind(account_id.as_str())
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let current = sqlx::query("SELECT points FROM accounts WHERE account_id = ?")
                .bind(account_id.as_str())
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match current {
                None => LedgerError::AccountNotFound(account_id.clone()),
                Some(row) => LedgerError::InsufficientBalance {
                    account_id: account_id.clone(),
                    balance: row.get("points"),
                    requested: amount,
                },
            });
        }

        let movement = insert_movement(
            &mut tx,
            account_id,
            MovementKind::Use,
            amount,
            order_id.as_str(),
            now,
        )
        .await
        .map_err(|e| duplicate_or_storage(e, order_id, MovementKind::Use))?;

        tx.commit().await?;
        debug!(account_id = %account_id, order_id = %order_id, amount, "Points debited");
        Ok(movement)
    }

    async fn refund(
        &self,
        account_id: &AccountId,
        amount: i64,
        order_id: &OrderId,
    ) -> Result<LedgerMovement, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let now = TimeMs::now();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE accounts SET points = points + ?, updated_at = ? WHERE account_id = ?",
        )
        .bind(amount)
        .bind(now.as_ms())
        .bind(account_id.as_str())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(LedgerError::AccountNotFound(account_id.clone()));
        }

        // The unique index on REFUND rows rolls the credit back on a second attempt.
        let movement = insert_movement(
            &mut tx,
            account_id,
            MovementKind::Refund,
            amount,
            order_id.as_str(),
            now,
        )
        .await
        .map_err(|e| duplicate_or_storage(e, order_id, MovementKind::Refund))?;

        tx.commit().await?;
        debug!(account_id = %account_id, order_id = %order_id, amount, "Points refunded");
        Ok(movement)
    }

    async fn find_movement(
        &self,
        order_id: &OrderId,
        kind: MovementKind,
    ) -> Result<Option<LedgerMovement>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, kind, amount, correlation_id, created_at
            FROM ledger_movements
            WHERE correlation_id = ? AND kind = ?
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(order_id.as_str())
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(movement_from_row).transpose()?)
    }
}

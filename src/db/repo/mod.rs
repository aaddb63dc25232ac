//! Repository layer for database operations.
//!
//! Methods are organized across submodules by store:
//! - `ledger.rs` - points accounts and movements (`LedgerStore`)
//! - `settlements.rs` - settlement rows (`SettlementStore`)
//! - `audit.rs` - interface history (`AuditSink`)

mod audit;
mod ledger;
mod settlements;

use crate::domain::{Account, AccountId, LedgerMovement, MovementKind, TimeMs};
use crate::store::LedgerError;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::info;

/// Correlation id recorded on the EARN movement of a newly opened account.
pub const OPENING_CORRELATION: &str = "ACCOUNT_OPENING";

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create an account, crediting `initial_points` with an EARN movement
    /// when positive.
    ///
    /// # Errors
    /// Returns an error if the account already exists or the write fails.
    pub async fn open_account(
        &self,
        account_id: &AccountId,
        initial_points: i64,
    ) -> Result<Account, LedgerError> {
        if initial_points < 0 {
            return Err(LedgerError::InvalidAmount(initial_points));
        }
        let now = TimeMs::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO accounts (account_id, points, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(account_id.as_str())
        .bind(initial_points)
        .bind(now.as_ms())
        .bind(now.as_ms())
        .execute(&mut *tx)
        .await?;

        if initial_points > 0 {
            insert_movement(
                &mut tx,
                account_id,
                MovementKind::Earn,
                initial_points,
                OPENING_CORRELATION,
                now,
            )
            .await?;
        }

        tx.commit().await?;
        info!(account_id = %account_id, initial_points, "Account opened");

        Ok(Account {
            account_id: account_id.clone(),
            balance: initial_points,
            updated_at: now,
        })
    }

    /// Credit points with an EARN movement, atomically.
    ///
    /// # Errors
    /// Returns `AccountNotFound` if the account does not exist.
    pub async fn earn_points(
        &self,
        account_id: &AccountId,
        amount: i64,
        correlation_id: &str,
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

        let movement = insert_movement(
            &mut tx,
            account_id,
            MovementKind::Earn,
            amount,
            correlation_id,
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(movement)
    }

    /// Ledger history for an account, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_movements(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<LedgerMovement>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, kind, amount, correlation_id, created_at
            FROM ledger_movements
            WHERE account_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(account_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(movement_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

/// Append one movement inside the caller's transaction.
pub(crate) async fn insert_movement(
    conn: &mut SqliteConnection,
    account_id: &AccountId,
    kind: MovementKind,
    amount: i64,
    correlation_id: &str,
    at: TimeMs,
) -> Result<LedgerMovement, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO ledger_movements (account_id, kind, amount, correlation_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(account_id.as_str())
    .bind(kind.as_str())
    .bind(amount)
    .bind(correlation_id)
    .bind(at.as_ms())
    .execute(&mut *conn)
    .await?;

    Ok(LedgerMovement {
        id: result.last_insert_rowid(),
        account_id: account_id.clone(),
        kind,
        amount,
        correlation_id: correlation_id.to_string(),
        created_at: at,
    })
}

pub(crate) fn movement_from_row(row: &SqliteRow) -> Result<LedgerMovement, sqlx::Error> {
    let kind: String = row.get("kind");
    Ok(LedgerMovement {
        id: row.get("id"),
        account_id: AccountId::new(row.get::<String, _>("account_id")),
        kind: kind.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))?,
        amount: row.get("amount"),
        correlation_id: row.get("correlation_id"),
        created_at: TimeMs::new(row.get("created_at")),
    })
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

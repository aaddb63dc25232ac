//! Settlement row operations for the repository.

use super::{is_unique_violation, Repository};
use crate::domain::{
    AccountId, NewSettlement, OrderId, PaymentMethod, SettlementPhase, SettlementRecord, TimeMs,
};
use crate::store::{SettlementStore, SettlementStoreError};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

const SELECT_COLUMNS: &str = r#"
    SELECT id, order_id, account_id, method, phase, provider, amount, transaction_id, created_at
    FROM settlements
"#;

async fn insert_settlement(
    conn: &mut SqliteConnection,
    row: &NewSettlement,
) -> Result<SettlementRecord, SettlementStoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO settlements (
            order_id, account_id, method, phase, provider, amount, transaction_id, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(row.order_id.as_str())
    .bind(row.account_id.as_str())
    .bind(row.method.as_str())
    .bind(row.phase.as_str())
    .bind(row.provider.as_deref())
    .bind(row.amount)
    .bind(row.transaction_id.as_deref())
    .bind(row.created_at.as_ms())
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            SettlementStoreError::AlreadyCancelled {
                order_id: row.order_id.clone(),
                method: row.method.to_string(),
            }
        } else {
            SettlementStoreError::Storage(e)
        }
    })?;

    Ok(SettlementRecord {
        id: result.last_insert_rowid(),
        order_id: row.order_id.clone(),
        account_id: row.account_id.clone(),
        method: row.method,
        phase: row.phase,
        provider: row.provider.clone(),
        amount: row.amount,
        transaction_id: row.transaction_id.clone(),
        created_at: row.created_at,
    })
}

fn settlement_from_row(row: &SqliteRow) -> Result<SettlementRecord, sqlx::Error> {
    let method: String = row.get("method");
    let phase: String = row.get("phase");
    Ok(SettlementRecord {
        id: row.get("id"),
        order_id: OrderId::new(row.get::<String, _>("order_id")),
        account_id: AccountId::new(row.get::<String, _>("account_id")),
        method: method
            .parse::<PaymentMethod>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        phase: phase
            .parse::<SettlementPhase>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?,
        provider: row.get("provider"),
        amount: row.get("amount"),
        transaction_id: row.get("transaction_id"),
        created_at: TimeMs::new(row.get("created_at")),
    })
}

fn collect(rows: &[SqliteRow]) -> Result<Vec<SettlementRecord>, SettlementStoreError> {
    Ok(rows
        .iter()
        .map(settlement_from_row)
        .collect::<Result<Vec<_>, _>>()?)
}

#[async_trait]
impl SettlementStore for Repository {
    async fn save_all(
        &self,
        rows: &[NewSettlement],
    ) -> Result<Vec<SettlementRecord>, SettlementStoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let mut saved = Vec::with_capacity(rows.len());
        for row in rows {
            saved.push(insert_settlement(&mut tx, row).await?);
        }
        tx.commit().await?;
        Ok(saved)
    }

    async fn save(&self, row: &NewSettlement) -> Result<SettlementRecord, SettlementStoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_settlement(&mut conn, row).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<SettlementRecord>, SettlementStoreError> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(settlement_from_row).transpose()?)
    }

    async fn find_by_order_id(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<SettlementRecord>, SettlementStoreError> {
        let rows = sqlx::query(&format!(
            "{} WHERE order_id = ? ORDER BY id ASC",
            SELECT_COLUMNS
        ))
        .bind(order_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        collect(&rows)
    }

    async fn find_by_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<SettlementRecord>, SettlementStoreError> {
        let rows = sqlx::query(&format!(
            "{} WHERE account_id = ? ORDER BY created_at DESC, id DESC",
            SELECT_COLUMNS
        ))
        .bind(account_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        collect(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Repository) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("settlements.db");
        let pool = init_db(db_path.to_str().unwrap()).await.unwrap();
        (temp_dir, Repository::new(pool))
    }

    fn approve(method: PaymentMethod, amount: i64, tid: Option<&str>) -> NewSettlement {
        NewSettlement {
            order_id: OrderId::new("O1"),
            account_id: AccountId::new("m1"),
            method,
            phase: SettlementPhase::Approve,
            provider: tid.map(|_| "TOSS".to_string()),
            amount,
            transaction_id: tid.map(str::to_string),
            created_at: TimeMs::new(1_700_000_000_000),
        }
    }

    #[tokio::test]
    async fn test_save_all_and_find_by_order() {
        let (_dir, repo) = setup().await;
        let saved = repo
            .save_all(&[
                approve(PaymentMethod::Card, 14000, Some("T1")),
                approve(PaymentMethod::Points, 1000, None),
            ])
            .await
            .unwrap();
        assert_eq!(saved.len(), 2);

        let rows = repo.find_by_order_id(&OrderId::new("O1")).await.unwrap();
        assert_eq!(rows, saved);
        assert_eq!(rows[0].transaction_id.as_deref(), Some("T1"));
        assert_eq!(rows[1].provider, None);

        let by_id = repo.find_by_id(saved[1].id).await.unwrap().unwrap();
        assert_eq!(by_id.method, PaymentMethod::Points);
        assert!(repo.find_by_id(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_all_is_all_or_nothing() {
        let (_dir, repo) = setup().await;
        let mut cancel = approve(PaymentMethod::Points, 1000, None);
        cancel.phase = SettlementPhase::Cancel;

        let result = repo
            .save_all(&[
                approve(PaymentMethod::Points, 1000, None),
                cancel.clone(),
                cancel,
            ])
            .await;
        assert!(matches!(
            result,
            Err(SettlementStoreError::AlreadyCancelled { .. })
        ));
        assert!(repo
            .find_by_order_id(&OrderId::new("O1"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_find_by_account_newest_first() {
        let (_dir, repo) = setup().await;
        let first = repo
            .save(&approve(PaymentMethod::Points, 1000, None))
            .await
            .unwrap();
        let mut later = approve(PaymentMethod::Card, 500, Some("T2"));
        later.order_id = OrderId::new("O2");
        later.created_at = TimeMs::new(first.created_at.as_ms() + 1);
        let second = repo.save(&later).await.unwrap();

        let rows = repo.find_by_account(&AccountId::new("m1")).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![second.id, first.id]);
    }
}

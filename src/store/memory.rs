//! In-memory stores for testing without a database.

use super::{LedgerError, LedgerStore, SettlementStore, SettlementStoreError};
use crate::domain::{
    Account, AccountId, LedgerMovement, MovementKind, NewSettlement, OrderId, SettlementPhase,
    SettlementRecord, TimeMs,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<AccountId, Account>,
    movements: Vec<LedgerMovement>,
}

/// Ledger held in a single mutex; every operation is trivially atomic.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    fail_refunds: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account with a starting balance (no EARN movement is recorded).
    pub fn with_account(self, account_id: &str, balance: i64) -> Self {
        {
            let mut state = lock(&self.state);
            let id = AccountId::new(account_id);
            state.accounts.insert(
                id.clone(),
                Account {
                    account_id: id,
                    balance,
                    updated_at: TimeMs::new(0),
                },
            );
        }
        self
    }

    /// Make every subsequent refund fail with a storage error.
    pub fn fail_refunds(&self, fail: bool) {
        self.fail_refunds.store(fail, Ordering::SeqCst);
    }

    pub fn balance(&self, account_id: &str) -> Option<i64> {
        lock(&self.state)
            .accounts
            .get(&AccountId::new(account_id))
            .map(|a| a.balance)
    }

    pub fn movements(&self) -> Vec<LedgerMovement> {
        lock(&self.state).movements.clone()
    }

    fn append(
        state: &mut LedgerState,
        account_id: &AccountId,
        kind: MovementKind,
        amount: i64,
        order_id: &OrderId,
    ) -> LedgerMovement {
        let movement = LedgerMovement {
            id: state.movements.len() as i64 + 1,
            account_id: account_id.clone(),
            kind,
            amount,
            correlation_id: order_id.as_str().to_string(),
            created_at: TimeMs::now(),
        };
        state.movements.push(movement.clone());
        movement
    }

    fn has_movement(state: &LedgerState, order_id: &OrderId, kind: MovementKind) -> bool {
        state
            .movements
            .iter()
            .any(|m| m.kind == kind && m.is_for_order(order_id))
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn get_account(&self, account_id: &AccountId) -> Result<Account, LedgerError> {
        lock(&self.state)
            .accounts
            .get(account_id)
            .cloned()
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.clone()))
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
        let mut state = lock(&self.state);
        if Self::has_movement(&state, order_id, MovementKind::Use) {
            return Err(LedgerError::DuplicateMovement {
                order_id: order_id.clone(),
                kind: MovementKind::Use,
            });
        }
        let account = state
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.clone()))?;
        if !account.can_cover(amount) {
            return Err(LedgerError::InsufficientBalance {
                account_id: account_id.clone(),
                balance: account.balance,
                requested: amount,
            });
        }
        account.balance -= amount;
        account.updated_at = TimeMs::now();
        Ok(Self::append(&mut state, account_id, MovementKind::Use, amount, order_id))
    }

    async fn refund(
        &self,
        account_id: &AccountId,
        amount: i64,
        order_id: &OrderId,
    ) -> Result<LedgerMovement, LedgerError> {
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(LedgerError::Storage(sqlx::Error::PoolClosed));
        }
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut state = lock(&self.state);
        if Self::has_movement(&state, order_id, MovementKind::Refund) {
            return Err(LedgerError::DuplicateMovement {
                order_id: order_id.clone(),
                kind: MovementKind::Refund,
            });
        }
        let account = state
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.clone()))?;
        account.balance += amount;
        account.updated_at = TimeMs::now();
        Ok(Self::append(&mut state, account_id, MovementKind::Refund, amount, order_id))
    }

    async fn find_movement(
        &self,
        order_id: &OrderId,
        kind: MovementKind,
    ) -> Result<Option<LedgerMovement>, LedgerError> {
        Ok(lock(&self.state)
            .movements
            .iter()
            .find(|m| m.kind == kind && m.is_for_order(order_id))
            .cloned())
    }
}

/// Settlement rows in a vector; ids are 1-based insertion positions.
#[derive(Debug, Default)]
pub struct MemorySettlements {
    rows: Mutex<Vec<SettlementRecord>>,
    fail_saves: AtomicBool,
}

impl MemorySettlements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a storage error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<SettlementRecord> {
        lock(&self.rows).clone()
    }

    fn check_cancel(
        rows: &[SettlementRecord],
        row: &NewSettlement,
    ) -> Result<(), SettlementStoreError> {
        let duplicate = row.phase == SettlementPhase::Cancel
            && rows.iter().any(|r| {
                r.phase == SettlementPhase::Cancel
                    && r.order_id == row.order_id
                    && r.method == row.method
            });
        if duplicate {
            return Err(SettlementStoreError::AlreadyCancelled {
                order_id: row.order_id.clone(),
                method: row.method.to_string(),
            });
        }
        Ok(())
    }

    fn to_record(id: i64, row: &NewSettlement) -> SettlementRecord {
        SettlementRecord {
            id,
            order_id: row.order_id.clone(),
            account_id: row.account_id.clone(),
            method: row.method,
            phase: row.phase,
            provider: row.provider.clone(),
            amount: row.amount,
            transaction_id: row.transaction_id.clone(),
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl SettlementStore for MemorySettlements {
    async fn save_all(
        &self,
        rows: &[NewSettlement],
    ) -> Result<Vec<SettlementRecord>, SettlementStoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(SettlementStoreError::Storage(sqlx::Error::PoolClosed));
        }
        let mut stored = lock(&self.rows);
        let mut staged = stored.clone();
        let mut saved = Vec::with_capacity(rows.len());
        for row in rows {
            Self::check_cancel(&staged, row)?;
            let record = Self::to_record(staged.len() as i64 + 1, row);
            staged.push(record.clone());
            saved.push(record);
        }
        *stored = staged;
        Ok(saved)
    }

    async fn save(&self, row: &NewSettlement) -> Result<SettlementRecord, SettlementStoreError> {
        let mut saved = self.save_all(std::slice::from_ref(row)).await?;
        saved
            .pop()
            .ok_or(SettlementStoreError::Storage(sqlx::Error::RowNotFound))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<SettlementRecord>, SettlementStoreError> {
        Ok(lock(&self.rows).iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_order_id(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<SettlementRecord>, SettlementStoreError> {
        Ok(lock(&self.rows)
            .iter()
            .filter(|r| &r.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn find_by_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<SettlementRecord>, SettlementStoreError> {
        let mut rows: Vec<SettlementRecord> = lock(&self.rows)
            .iter()
            .filter(|r| &r.account_id == account_id)
            .cloned()
            .collect();
        rows.reverse();
        Ok(rows)
    }
}

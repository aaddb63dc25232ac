//! Storage abstraction for the points ledger and settlement records.
//!
//! The SQLite [`Repository`](crate::db::Repository) implements both traits for
//! production; [`MemoryLedger`] and [`MemorySettlements`] back unit tests.

use crate::domain::{
    Account, AccountId, LedgerMovement, MovementKind, NewSettlement, OrderId, SettlementRecord,
};
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;

pub use memory::{MemoryLedger, MemorySettlements};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),
    #[error("insufficient balance on {account_id}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        account_id: AccountId,
        balance: i64,
        requested: i64,
    },
    /// A USE or REFUND movement already exists for this order.
    #[error("{kind} movement already recorded for order {order_id}")]
    DuplicateMovement { order_id: OrderId, kind: MovementKind },
    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Points ledger access.
///
/// Every balance change is paired with its movement row in one atomic unit,
/// so the account row and its history can never disagree.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// # Errors
    /// Returns `AccountNotFound` if the account does not exist.
    async fn get_account(&self, account_id: &AccountId) -> Result<Account, LedgerError>;

    /// Debit `amount` and append a USE movement keyed by `order_id`.
    ///
    /// The balance check and the update are a single conditional write, so two
    /// concurrent debits can never drive the balance negative.
    ///
    /// # Errors
    /// `InsufficientBalance` leaves both the balance and the history untouched.
    async fn debit(
        &self,
        account_id: &AccountId,
        amount: i64,
        order_id: &OrderId,
    ) -> Result<LedgerMovement, LedgerError>;

    /// Credit `amount` back and append a REFUND movement keyed by `order_id`.
    ///
    /// # Errors
    /// `DuplicateMovement` if a REFUND for `order_id` already exists.
    async fn refund(
        &self,
        account_id: &AccountId,
        amount: i64,
        order_id: &OrderId,
    ) -> Result<LedgerMovement, LedgerError>;

    async fn find_movement(
        &self,
        order_id: &OrderId,
        kind: MovementKind,
    ) -> Result<Option<LedgerMovement>, LedgerError>;
}

#[derive(Debug, Error)]
pub enum SettlementStoreError {
    /// A CANCEL row already exists for the order+method pair.
    #[error("settlement already cancelled: order {order_id}, method {method}")]
    AlreadyCancelled { order_id: OrderId, method: String },
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Append-only settlement rows.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Write every row or none of them.
    async fn save_all(
        &self,
        rows: &[NewSettlement],
    ) -> Result<Vec<SettlementRecord>, SettlementStoreError>;

    async fn save(&self, row: &NewSettlement) -> Result<SettlementRecord, SettlementStoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<SettlementRecord>, SettlementStoreError>;

    /// Rows for one order, oldest first.
    async fn find_by_order_id(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<SettlementRecord>, SettlementStoreError>;

    /// Rows for one account, newest first.
    async fn find_by_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<SettlementRecord>, SettlementStoreError>;
}

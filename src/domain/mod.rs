//! Domain types for composite payment settlement.
//!
//! This module provides:
//! - Primitives: TimeMs, AccountId, OrderId, PaymentMethod
//! - Points accounts and ledger movements
//! - Legs and their transient outcomes
//! - Settlement records and the approve/cancel merge view

pub mod leg;
pub mod ledger;
pub mod primitives;
pub mod settlement;

pub use leg::{AuthPayload, Leg, LegOutcome};
pub use ledger::{Account, LedgerMovement, MovementKind};
pub use primitives::{AccountId, OrderId, PaymentMethod, TimeMs, UnknownMethod};
pub use settlement::{
    merge_settlements, NewSettlement, SettlementPhase, SettlementRecord, SettlementView,
};

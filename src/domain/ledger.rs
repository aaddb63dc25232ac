//! Points accounts and their append-only movement history.

use crate::domain::{AccountId, OrderId, TimeMs};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A points-holding account. Balance only changes through the ledger store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub balance: i64,
    pub updated_at: TimeMs,
}

impl Account {
    pub fn can_cover(&self, amount: i64) -> bool {
        self.balance >= amount
    }
}

/// Kind of ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementKind {
    Earn,
    Use,
    /// Neutralizes exactly one prior `Use` with the same correlation id.
    Refund,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Earn => "EARN",
            MovementKind::Use => "USE",
            MovementKind::Refund => "REFUND",
        }
    }

    /// Sign applied to the balance when this movement is recorded.
    pub fn sign(&self) -> i64 {
        match self {
            MovementKind::Earn | MovementKind::Refund => 1,
            MovementKind::Use => -1,
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EARN" => Ok(MovementKind::Earn),
            "USE" => Ok(MovementKind::Use),
            "REFUND" => Ok(MovementKind::Refund),
            other => Err(format!("unknown movement kind: {}", other)),
        }
    }
}

/// Immutable record of one balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMovement {
    pub id: i64,
    pub account_id: AccountId,
    pub kind: MovementKind,
    /// Always positive; direction comes from `kind`.
    pub amount: i64,
    /// Order id for USE/REFUND, free-form reason for EARN.
    pub correlation_id: String,
    pub created_at: TimeMs,
}

impl LedgerMovement {
    pub fn signed_amount(&self) -> i64 {
        self.kind.sign() * self.amount
    }

    pub fn is_for_order(&self, order_id: &OrderId) -> bool {
        self.correlation_id == order_id.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(kind: MovementKind, amount: i64) -> LedgerMovement {
        LedgerMovement {
            id: 1,
            account_id: AccountId::new("m1"),
            kind,
            amount,
            correlation_id: "O1".to_string(),
            created_at: TimeMs::new(0),
        }
    }

    #[test]
    fn test_signed_amounts() {
        assert_eq!(movement(MovementKind::Use, 500).signed_amount(), -500);
        assert_eq!(movement(MovementKind::Refund, 500).signed_amount(), 500);
        assert_eq!(movement(MovementKind::Earn, 1000).signed_amount(), 1000);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("REFUND".parse::<MovementKind>().unwrap(), MovementKind::Refund);
        assert!("refund".parse::<MovementKind>().is_err());
    }

    #[test]
    fn test_correlation_matches_order() {
        assert!(movement(MovementKind::Use, 1).is_for_order(&OrderId::new("O1")));
        assert!(!movement(MovementKind::Use, 1).is_for_order(&OrderId::new("O2")));
    }
}

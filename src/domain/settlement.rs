//! Settlement records: the durable facts of committed legs.

use crate::domain::{AccountId, OrderId, PaymentMethod, TimeMs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SettlementPhase {
    Approve,
    Cancel,
}

impl SettlementPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementPhase::Approve => "APPROVE",
            SettlementPhase::Cancel => "CANCEL",
        }
    }
}

impl std::fmt::Display for SettlementPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APPROVE" => Ok(SettlementPhase::Approve),
            "CANCEL" => Ok(SettlementPhase::Cancel),
            other => Err(format!("unknown settlement phase: {}", other)),
        }
    }
}

/// A settlement row that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSettlement {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub method: PaymentMethod,
    pub phase: SettlementPhase,
    /// `None` for internal legs.
    pub provider: Option<String>,
    pub amount: i64,
    pub transaction_id: Option<String>,
    pub created_at: TimeMs,
}

/// A persisted settlement row. Never updated in place: a cancellation is a
/// second row with `phase == Cancel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecord {
    pub id: i64,
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub method: PaymentMethod,
    pub phase: SettlementPhase,
    pub provider: Option<String>,
    pub amount: i64,
    pub transaction_id: Option<String>,
    pub created_at: TimeMs,
}

impl SettlementRecord {
    /// Build the CANCEL counterpart of an APPROVE record.
    pub fn cancellation(&self, at: TimeMs) -> NewSettlement {
        NewSettlement {
            order_id: self.order_id.clone(),
            account_id: self.account_id.clone(),
            method: self.method,
            phase: SettlementPhase::Cancel,
            provider: self.provider.clone(),
            amount: self.amount,
            transaction_id: None,
            created_at: at,
        }
    }
}

/// One order+method pair as the caller sees it: the approval, and when it
/// was cancelled (if ever).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementView {
    #[serde(flatten)]
    pub record: SettlementRecord,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<TimeMs>,
}

/// Merge APPROVE/CANCEL rows per (order, method), newest first.
///
/// The latest APPROVE row is the base; the latest CANCEL row (if any) marks it
/// cancelled. A CANCEL without an APPROVE is surfaced as-is.
pub fn merge_settlements(records: &[SettlementRecord]) -> Vec<SettlementView> {
    let mut groups: BTreeMap<(OrderId, PaymentMethod), Vec<&SettlementRecord>> = BTreeMap::new();
    for r in records {
        groups
            .entry((r.order_id.clone(), r.method))
            .or_default()
            .push(r);
    }

    let latest = |rows: &[&SettlementRecord], phase: SettlementPhase| {
        rows.iter()
            .filter(|r| r.phase == phase)
            .max_by_key(|r| (r.created_at, r.id))
            .map(|r| (*r).clone())
    };

    let mut views: Vec<SettlementView> = groups
        .values()
        .filter_map(|rows| {
            let approve = latest(rows, SettlementPhase::Approve);
            let cancel = latest(rows, SettlementPhase::Cancel);
            match (approve, cancel) {
                (Some(record), cancel) => Some(SettlementView {
                    record,
                    cancelled: cancel.is_some(),
                    cancelled_at: cancel.map(|c| c.created_at),
                }),
                (None, Some(record)) => Some(SettlementView {
                    cancelled_at: Some(record.created_at),
                    record,
                    cancelled: true,
                }),
                (None, None) => None,
            }
        })
        .collect();

    views.sort_by(|a, b| {
        (b.record.created_at, b.record.id).cmp(&(a.record.created_at, a.record.id))
    });
    views
}

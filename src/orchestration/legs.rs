//! Turns a payment request into an ordered, validated list of legs.

use crate::domain::{AccountId, AuthPayload, Leg, OrderId, PaymentMethod};
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

/// A composite payment request.
///
/// Either `legs` is given explicitly, or the legacy shape is used: the whole
/// `total_amount` with an optional `use_points` portion.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub order_id: OrderId,
    #[serde(alias = "memberId")]
    pub account_id: AccountId,
    #[serde(alias = "amount")]
    pub total_amount: i64,
    #[serde(default, alias = "paymentMethods")]
    pub legs: Vec<Leg>,
    #[serde(default)]
    pub use_points: i64,
    #[serde(default, alias = "pgProvider")]
    pub provider: Option<String>,
    #[serde(default, alias = "authData")]
    pub auth: AuthPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("total amount must be positive, got {0}")]
    InvalidTotal(i64),
    #[error("no payment legs")]
    EmptyLegs,
    #[error("{method} leg amount must be positive, got {amount}")]
    NonPositiveAmount { method: PaymentMethod, amount: i64 },
    #[error("points to use ({points}) must be between 0 and the total ({total})")]
    InvalidPoints { points: i64, total: i64 },
    #[error("method {0} appears more than once")]
    DuplicateMethod(PaymentMethod),
    #[error("amount mismatch: legs sum to {sum}, total is {total}")]
    AmountMismatch { total: i64, sum: i64 },
    #[error("leg amounts overflow when summed")]
    AmountOverflow,
}

/// Resolve and validate the legs of `request`. Performs no I/O.
///
/// # Errors
/// Any `ValidationError`; nothing has been executed when one is returned.
pub fn resolve_legs(request: &PaymentRequest) -> Result<Vec<Leg>, ValidationError> {
    if request.order_id.as_str().trim().is_empty() {
        return Err(ValidationError::MissingField("orderId"));
    }
    if request.account_id.as_str().trim().is_empty() {
        return Err(ValidationError::MissingField("accountId"));
    }
    if request.total_amount <= 0 {
        return Err(ValidationError::InvalidTotal(request.total_amount));
    }

    let legs = if request.legs.is_empty() {
        expand_legacy(request.total_amount, request.use_points)?
    } else {
        request.legs.clone()
    };

    validate_legs(request.total_amount, &legs)?;
    Ok(legs)
}

/// Points first when non-zero, the remainder on card.
///
/// # Errors
/// `InvalidPoints` when `use_points` is negative or exceeds `total`.
pub fn expand_legacy(total: i64, use_points: i64) -> Result<Vec<Leg>, ValidationError> {
    if use_points < 0 || use_points > total {
        return Err(ValidationError::InvalidPoints {
            points: use_points,
            total,
        });
    }

    let mut legs = Vec::with_capacity(2);
    if use_points > 0 {
        legs.push(Leg::new(PaymentMethod::Points, use_points));
    }
    let remainder = total - use_points;
    if remainder > 0 {
        legs.push(Leg::new(PaymentMethod::Card, remainder));
    }
    Ok(legs)
}

/// # Errors
/// Empty list, non-positive amounts, repeated methods, or a sum that
/// overflows or differs from `total`.
pub fn validate_legs(total: i64, legs: &[Leg]) -> Result<(), ValidationError> {
    if legs.is_empty() {
        return Err(ValidationError::EmptyLegs);
    }

    let mut seen = HashSet::new();
    let mut sum: i64 = 0;
    for leg in legs {
        if leg.amount <= 0 {
            return Err(ValidationError::NonPositiveAmount {
                method: leg.method,
                amount: leg.amount,
            });
        }
        // Settlement and ledger rows are keyed by order+method.
        if !seen.insert(leg.method) {
            return Err(ValidationError::DuplicateMethod(leg.method));
        }
        sum = sum
            .checked_add(leg.amount)
            .ok_or(ValidationError::AmountOverflow)?;
    }

    if sum != total {
        return Err(ValidationError::AmountMismatch { total, sum });
    }
    Ok(())
}

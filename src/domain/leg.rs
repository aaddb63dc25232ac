//! Legs of a composite payment and their in-memory outcomes.

use crate::domain::{OrderId, PaymentMethod};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One declared `{method, amount}` component of a composite payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leg {
    #[serde(alias = "paymentMethod")]
    pub method: PaymentMethod,
    pub amount: i64,
}

impl Leg {
    pub fn new(method: PaymentMethod, amount: i64) -> Self {
        Self { method, amount }
    }
}

/// Provider-specific authorization artifacts handed over by the client after
/// the provider's own auth step (payment key, auth token, auth URL, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthPayload(pub BTreeMap<String, String>);

impl AuthPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    /// Non-blank value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| v.trim().is_empty())
    }
}

/// Result of one successfully executed leg.
///
/// Lives only until the order either commits (becomes settlement rows) or is
/// compensated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegOutcome {
    pub method: PaymentMethod,
    pub order_id: OrderId,
    pub amount: i64,
    /// Provider transaction id; `None` for internal legs.
    pub transaction_id: Option<String>,
    /// Provider tag the leg was executed against; `None` for internal legs.
    pub provider: Option<String>,
    pub raw: serde_json::Value,
}

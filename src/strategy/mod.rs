//! Per-method payment strategies.
//!
//! Each strategy executes, cancels and compensates one kind of leg. The
//! orchestrator only ever talks to them through [`PaymentStrategy`], looked
//! up in a [`StrategyRegistry`] built once at startup.

use crate::domain::{AccountId, AuthPayload, Leg, LegOutcome, MovementKind, OrderId, PaymentMethod};
use crate::gateway::GatewayError;
use crate::store::LedgerError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod card;
pub mod points;

pub use card::CardStrategy;
pub use points::PointsStrategy;

/// Reason sent to providers when a leg is reversed because a sibling failed.
pub const NET_CANCEL_REASON: &str = "System net cancellation: another leg of the order failed";

/// Order-level inputs every leg of one payment shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentContext {
    pub order_id: OrderId,
    pub account_id: AccountId,
    /// Requested provider tag; blank means the configured default.
    pub provider: Option<String>,
    pub auth: AuthPayload,
}

/// Post-hoc cancellation of one settled leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub amount: i64,
    pub transaction_id: Option<String>,
    pub provider: Option<String>,
    pub reason: String,
}

impl CancelRequest {
    /// Cancellation that reverses a leg committed earlier in the same order.
    pub fn compensating(ctx: &PaymentContext, outcome: &LegOutcome) -> Self {
        Self {
            order_id: outcome.order_id.clone(),
            account_id: ctx.account_id.clone(),
            amount: outcome.amount,
            transaction_id: outcome.transaction_id.clone(),
            provider: outcome.provider.clone(),
            reason: NET_CANCEL_REASON.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("no strategy registered for method {0}")]
    UnsupportedMethod(PaymentMethod),
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),
    #[error("insufficient balance: balance {balance}, requested {requested}")]
    InsufficientBalance { balance: i64, requested: i64 },
    #[error("nothing to cancel for order {0}")]
    NothingToCancel(OrderId),
    #[error("order {0} is already cancelled")]
    AlreadyCancelled(OrderId),
    #[error("amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch { expected: i64, actual: i64 },
    #[error("order {0} already used points")]
    DuplicateOrder(OrderId),
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),
    #[error("missing authorization data: {0}")]
    MissingAuthData(&'static str),
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),
    #[error("missing transaction id")]
    MissingTransactionId,
    #[error("gateway error: {0}")]
    Gateway(GatewayError),
    #[error("ledger storage error: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for StrategyError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AccountNotFound(id) => StrategyError::AccountNotFound(id),
            LedgerError::InsufficientBalance {
                balance, requested, ..
            } => StrategyError::InsufficientBalance { balance, requested },
            LedgerError::DuplicateMovement {
                order_id,
                kind: MovementKind::Refund,
            } => StrategyError::AlreadyCancelled(order_id),
            LedgerError::DuplicateMovement { order_id, .. } => {
                StrategyError::DuplicateOrder(order_id)
            }
            LedgerError::InvalidAmount(amount) => StrategyError::InvalidAmount(amount),
            other @ LedgerError::Storage(_) => StrategyError::Ledger(other),
        }
    }
}

impl From<GatewayError> for StrategyError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::MissingField(field) => StrategyError::MissingAuthData(field),
            GatewayError::MissingTransactionId => StrategyError::MissingTransactionId,
            other => StrategyError::Gateway(other),
        }
    }
}

/// Execution contract shared by every payment method.
#[async_trait]
pub trait PaymentStrategy: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// Execute one leg. On error, nothing has been committed for this leg.
    async fn process_payment(
        &self,
        ctx: &PaymentContext,
        leg: &Leg,
    ) -> Result<LegOutcome, StrategyError>;

    /// Reverse a settled leg on request.
    async fn cancel_payment(&self, request: &CancelRequest) -> Result<LegOutcome, StrategyError>;

    /// Reverse a leg committed earlier in the same order because a later
    /// leg failed. Never retried by the caller.
    async fn perform_net_cancellation(
        &self,
        ctx: &PaymentContext,
        outcome: &LegOutcome,
    ) -> Result<(), StrategyError>;
}

/// Method tag to strategy table.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<PaymentMethod, Arc<dyn PaymentStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy under its own method, replacing any previous one.
    pub fn with_strategy(mut self, strategy: Arc<dyn PaymentStrategy>) -> Self {
        self.strategies.insert(strategy.method(), strategy);
        self
    }

    /// # Errors
    /// Returns `UnsupportedMethod` if nothing is registered for `method`.
    pub fn get(&self, method: PaymentMethod) -> Result<Arc<dyn PaymentStrategy>, StrategyError> {
        self.strategies
            .get(&method)
            .cloned()
            .ok_or(StrategyError::UnsupportedMethod(method))
    }

    pub fn methods(&self) -> Vec<PaymentMethod> {
        let mut methods: Vec<_> = self.strategies.keys().copied().collect();
        methods.sort();
        methods
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}

//! Drives the legs of one order through their strategies.
//!
//! Legs run strictly in declared order. Each committed leg is pushed onto a
//! stack; on the first failure the stack is unwound (LIFO) through
//! `perform_net_cancellation`. Settlement rows are written only once every
//! leg has committed, in one batch.

use super::legs::{resolve_legs, PaymentRequest, ValidationError};
use crate::domain::{
    merge_settlements, AccountId, LegOutcome, NewSettlement, OrderId, PaymentMethod,
    SettlementPhase, SettlementView, TimeMs,
};
use crate::store::{SettlementStore, SettlementStoreError};
use crate::strategy::{
    CancelRequest, PaymentContext, PaymentStrategy, StrategyError, StrategyRegistry,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Reason sent to providers for a cancellation requested by settlement id.
pub const REQUESTED_CANCEL_REASON: &str = "Cancellation requested";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Validating,
    ExecutingLegs,
    AllCommitted,
    Persisted,
    Compensating,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegState {
    Pending,
    Executing,
    Committed,
    Failed,
}

/// How bad a failure is for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Refused with nothing executed or reversed.
    Rejected,
    /// A leg failed, or an earlier leg had to be reversed. Every reversal
    /// succeeded.
    Failed,
    /// Money or points moved and the system is known to be inconsistent.
    Fatal,
}

/// A committed leg whose compensation failed.
#[derive(Debug)]
pub struct CompensationFault {
    pub outcome: LegOutcome,
    pub error: StrategyError,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    /// A leg failed; every earlier leg was compensated.
    #[error("{method} leg failed: {source}")]
    LegFailed {
        method: PaymentMethod,
        #[source]
        source: StrategyError,
        /// Methods of the legs reversed because of this failure, in unwind order.
        compensated: Vec<PaymentMethod>,
    },
    #[error(
        "compensation failed for order {order_id} after {method} leg failed ({cause}); {} leg(s) left uncompensated",
        .faults.len()
    )]
    CompensationFailure {
        order_id: OrderId,
        method: PaymentMethod,
        cause: StrategyError,
        faults: Vec<CompensationFault>,
    },
    #[error("settlement rows for order {order_id} could not be written: {source}")]
    PersistenceFailure {
        order_id: OrderId,
        committed: Vec<LegOutcome>,
        #[source]
        source: SettlementStoreError,
    },
    #[error("settlement not found: {0}")]
    SettlementNotFound(i64),
    #[error("no settlements for order {0}")]
    OrderNotFound(OrderId),
    #[error("settlement {0} is a cancellation record")]
    NotCancellable(i64),
    #[error("order {order_id} {method} leg is already cancelled")]
    AlreadyCancelled {
        order_id: OrderId,
        method: PaymentMethod,
    },
    #[error("cancellation failed: {0}")]
    CancelFailed(StrategyError),
    #[error("settlement store error: {0}")]
    Store(SettlementStoreError),
}

impl PaymentError {
    pub fn severity(&self) -> Severity {
        match self {
            PaymentError::CompensationFailure { .. } | PaymentError::PersistenceFailure { .. } => {
                Severity::Fatal
            }
            PaymentError::LegFailed { compensated, .. } if !compensated.is_empty() => {
                Severity::Failed
            }
            PaymentError::LegFailed { source, .. } | PaymentError::CancelFailed(source) => {
                match source {
                    StrategyError::Gateway(_) | StrategyError::Ledger(_) => Severity::Failed,
                    _ => Severity::Rejected,
                }
            }
            PaymentError::Store(_) => Severity::Failed,
            PaymentError::Validation(_)
            | PaymentError::SettlementNotFound(_)
            | PaymentError::OrderNotFound(_)
            | PaymentError::NotCancellable(_)
            | PaymentError::AlreadyCancelled { .. } => Severity::Rejected,
        }
    }

    /// Whether the same request may succeed if sent again.
    ///
    /// Only transport-level failures that left nothing reversed qualify.
    /// A reversed points leg keeps its USE movement, so the order id cannot
    /// use points again and a retry needs a new order id.
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::LegFailed { compensated, .. } if !compensated.is_empty() => false,
            PaymentError::LegFailed {
                source: StrategyError::Gateway(e),
                ..
            }
            | PaymentError::CancelFailed(StrategyError::Gateway(e)) => e.is_transient(),
            PaymentError::LegFailed {
                source: StrategyError::Ledger(_),
                ..
            } => true,
            PaymentError::Store(SettlementStoreError::Storage(_)) => true,
            _ => false,
        }
    }
}

/// One committed leg in a successful payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegReceipt {
    pub settlement_id: i64,
    pub method: PaymentMethod,
    pub amount: i64,
    pub transaction_id: Option<String>,
    pub provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub status: &'static str,
    pub order_id: OrderId,
    pub processed_amount: i64,
    pub leg_count: usize,
    pub leg_results: Vec<LegReceipt>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelReceipt {
    pub status: &'static str,
    pub settlement_id: i64,
    pub cancel_settlement_id: i64,
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub cancelled_amount: i64,
}

/// Progress of one order, for logging.
struct OrderRun<'a> {
    order_id: &'a OrderId,
    state: OrderState,
    legs: Vec<LegState>,
}

impl<'a> OrderRun<'a> {
    fn new(order_id: &'a OrderId) -> Self {
        Self {
            order_id,
            state: OrderState::Validating,
            legs: Vec::new(),
        }
    }

    fn advance(&mut self, state: OrderState) {
        debug!(order_id = %self.order_id, from = ?self.state, to = ?state, "Order state");
        self.state = state;
    }

    fn leg(&mut self, index: usize, state: LegState) {
        if let Some(slot) = self.legs.get_mut(index) {
            *slot = state;
        }
        debug!(order_id = %self.order_id, leg = index, state = ?state, "Leg state");
    }
}

/// Composite-payment orchestrator.
#[derive(Clone)]
pub struct Orchestrator {
    strategies: StrategyRegistry,
    settlements: Arc<dyn SettlementStore>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("strategies", &self.strategies)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(strategies: StrategyRegistry, settlements: Arc<dyn SettlementStore>) -> Self {
        Self {
            strategies,
            settlements,
        }
    }

    /// Execute every leg of `request`, compensating on the first failure.
    ///
    /// # Errors
    /// - `Validation` before anything executes
    /// - `LegFailed` when a leg fails and all earlier legs were reversed
    /// - `CompensationFailure` when a reversal itself failed (fatal)
    /// - `PersistenceFailure` when every leg committed but the rows could not
    ///   be written (fatal)
    pub async fn process_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentReceipt, PaymentError> {
        let mut run = OrderRun::new(&request.order_id);
        let legs = resolve_legs(request)?;

        let mut plan: Vec<Arc<dyn PaymentStrategy>> = Vec::with_capacity(legs.len());
        for leg in &legs {
            let strategy = self
                .strategies
                .get(leg.method)
                .map_err(|source| PaymentError::LegFailed {
                    method: leg.method,
                    source,
                    compensated: Vec::new(),
                })?;
            plan.push(strategy);
        }

        let ctx = PaymentContext {
            order_id: request.order_id.clone(),
            account_id: request.account_id.clone(),
            provider: request.provider.clone(),
            auth: request.auth.clone(),
        };

        info!(
            order_id = %ctx.order_id,
            account_id = %ctx.account_id,
            total = request.total_amount,
            legs = legs.len(),
            "Processing payment"
        );

        run.legs = vec![LegState::Pending; legs.len()];
        run.advance(OrderState::ExecutingLegs);

        let mut committed: Vec<(LegOutcome, Arc<dyn PaymentStrategy>)> = Vec::new();
        for (index, (leg, strategy)) in legs.iter().zip(plan).enumerate() {
            run.leg(index, LegState::Executing);
            match strategy.process_payment(&ctx, leg).await {
                Ok(outcome) => {
                    run.leg(index, LegState::Committed);
                    committed.push((outcome, strategy));
                }
                Err(cause) => {
                    run.leg(index, LegState::Failed);
                    warn!(
                        order_id = %ctx.order_id,
                        method = %leg.method,
                        amount = leg.amount,
                        error = %cause,
                        committed = committed.len(),
                        "Leg failed"
                    );
                    run.advance(OrderState::Compensating);
                    let err = compensate(&ctx, committed, leg.method, cause).await;
                    run.advance(OrderState::Failed);
                    return Err(err);
                }
            }
        }
        run.advance(OrderState::AllCommitted);

        let outcomes: Vec<LegOutcome> = committed.into_iter().map(|(o, _)| o).collect();
        let now = TimeMs::now();
        let rows: Vec<NewSettlement> = outcomes
            .iter()
            .map(|o| NewSettlement {
                order_id: o.order_id.clone(),
                account_id: ctx.account_id.clone(),
                method: o.method,
                phase: SettlementPhase::Approve,
                provider: o.provider.clone(),
                amount: o.amount,
                transaction_id: o.transaction_id.clone(),
                created_at: now,
            })
            .collect();

        let saved = match self.settlements.save_all(&rows).await {
            Ok(saved) => saved,
            Err(source) => {
                error!(
                    order_id = %ctx.order_id,
                    legs = ?outcomes,
                    error = %source,
                    "All legs committed but settlement rows were not written"
                );
                run.advance(OrderState::Failed);
                return Err(PaymentError::PersistenceFailure {
                    order_id: ctx.order_id.clone(),
                    committed: outcomes,
                    source,
                });
            }
        };
        run.advance(OrderState::Persisted);

        let leg_results: Vec<LegReceipt> = saved
            .iter()
            .map(|r| LegReceipt {
                settlement_id: r.id,
                method: r.method,
                amount: r.amount,
                transaction_id: r.transaction_id.clone(),
                provider: r.provider.clone(),
            })
            .collect();

        info!(
            order_id = %ctx.order_id,
            amount = request.total_amount,
            legs = leg_results.len(),
            "Payment settled"
        );

        Ok(PaymentReceipt {
            status: "SUCCESS",
            order_id: ctx.order_id,
            processed_amount: request.total_amount,
            leg_count: leg_results.len(),
            leg_results,
        })
    }

    /// Cancel one settled leg by its APPROVE settlement id.
    ///
    /// # Errors
    /// `SettlementNotFound`, `NotCancellable` or `AlreadyCancelled` without
    /// side effects; `CancelFailed` when the strategy refuses;
    /// `PersistenceFailure` (fatal) when the reversal happened but the CANCEL
    /// row could not be written.
    pub async fn cancel_settlement(&self, settlement_id: i64) -> Result<CancelReceipt, PaymentError> {
        let record = self
            .settlements
            .find_by_id(settlement_id)
            .await
            .map_err(PaymentError::Store)?
            .ok_or(PaymentError::SettlementNotFound(settlement_id))?;

        if record.phase == SettlementPhase::Cancel {
            return Err(PaymentError::NotCancellable(settlement_id));
        }

        let already_cancelled = self
            .settlements
            .find_by_order_id(&record.order_id)
            .await
            .map_err(PaymentError::Store)?
            .iter()
            .any(|r| r.phase == SettlementPhase::Cancel && r.method == record.method);
        if already_cancelled {
            return Err(PaymentError::AlreadyCancelled {
                order_id: record.order_id.clone(),
                method: record.method,
            });
        }

        let strategy = self
            .strategies
            .get(record.method)
            .map_err(PaymentError::CancelFailed)?;

        let outcome = strategy
            .cancel_payment(&CancelRequest {
                order_id: record.order_id.clone(),
                account_id: record.account_id.clone(),
                amount: record.amount,
                transaction_id: record.transaction_id.clone(),
                provider: record.provider.clone(),
                reason: REQUESTED_CANCEL_REASON.to_string(),
            })
            .await
            .map_err(|e| match e {
                StrategyError::AlreadyCancelled(order_id) => PaymentError::AlreadyCancelled {
                    order_id,
                    method: record.method,
                },
                other => PaymentError::CancelFailed(other),
            })?;

        let mut row = record.cancellation(TimeMs::now());
        row.transaction_id = outcome.transaction_id.clone();

        let saved = match self.settlements.save(&row).await {
            Ok(saved) => saved,
            Err(SettlementStoreError::AlreadyCancelled { .. }) => {
                return Err(PaymentError::AlreadyCancelled {
                    order_id: record.order_id.clone(),
                    method: record.method,
                });
            }
            Err(source) => {
                error!(
                    settlement_id,
                    order_id = %record.order_id,
                    method = %record.method,
                    error = %source,
                    "Leg reversed but CANCEL row was not written"
                );
                return Err(PaymentError::PersistenceFailure {
                    order_id: record.order_id.clone(),
                    committed: vec![outcome],
                    source,
                });
            }
        };

        info!(
            settlement_id,
            order_id = %record.order_id,
            method = %record.method,
            amount = record.amount,
            "Settlement cancelled"
        );

        Ok(CancelReceipt {
            status: "CANCELLED",
            settlement_id,
            cancel_settlement_id: saved.id,
            order_id: record.order_id,
            method: record.method,
            cancelled_amount: record.amount,
        })
    }

    /// Settlement views for one order.
    ///
    /// # Errors
    /// `OrderNotFound` if the order has no rows.
    pub async fn order_settlements(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<SettlementView>, PaymentError> {
        let rows = self
            .settlements
            .find_by_order_id(order_id)
            .await
            .map_err(PaymentError::Store)?;
        if rows.is_empty() {
            return Err(PaymentError::OrderNotFound(order_id.clone()));
        }
        Ok(merge_settlements(&rows))
    }

    /// Settlement views for one account, newest first.
    pub async fn account_settlements(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<SettlementView>, PaymentError> {
        let rows = self
            .settlements
            .find_by_account(account_id)
            .await
            .map_err(PaymentError::Store)?;
        Ok(merge_settlements(&rows))
    }
}

/// Unwind `committed` in reverse order. Every reversal is attempted even if
/// an earlier one fails.
async fn compensate(
    ctx: &PaymentContext,
    mut committed: Vec<(LegOutcome, Arc<dyn PaymentStrategy>)>,
    method: PaymentMethod,
    cause: StrategyError,
) -> PaymentError {
    let mut faults = Vec::new();
    let mut compensated = Vec::with_capacity(committed.len());
    while let Some((outcome, strategy)) = committed.pop() {
        match strategy.perform_net_cancellation(ctx, &outcome).await {
            Ok(()) => {
                info!(
                    order_id = %ctx.order_id,
                    method = %outcome.method,
                    amount = outcome.amount,
                    "Leg compensated"
                );
                compensated.push(outcome.method);
            }
            Err(error) => {
                error!(
                    order_id = %ctx.order_id,
                    method = %outcome.method,
                    amount = outcome.amount,
                    transaction_id = ?outcome.transaction_id,
                    error = %error,
                    "Compensation failed"
                );
                faults.push(CompensationFault { outcome, error });
            }
        }
    }

    if faults.is_empty() {
        PaymentError::LegFailed {
            method,
            source: cause,
            compensated,
        }
    } else {
        error!(
            order_id = %ctx.order_id,
            failed_method = %method,
            uncompensated = faults.len(),
            "Order left inconsistent"
        );
        PaymentError::CompensationFailure {
            order_id: ctx.order_id.clone(),
            method,
            cause,
            faults,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuthPayload, Leg, MovementKind};
    use crate::gateway::{GatewayError, GatewayRegistry, MockGateway};
    use crate::store::{MemoryLedger, MemorySettlements};
    use crate::strategy::{CardStrategy, PointsStrategy};

    struct Fixture {
        ledger: Arc<MemoryLedger>,
        settlements: Arc<MemorySettlements>,
        toss: MockGateway,
        orchestrator: Orchestrator,
    }

    fn fixture(balance: i64, toss: MockGateway) -> Fixture {
        let ledger = Arc::new(MemoryLedger::new().with_account("m1", balance));
        let settlements = Arc::new(MemorySettlements::new());
        let gateways = GatewayRegistry::new("TOSS").with_adapter(Arc::new(toss.clone()));
        let strategies = StrategyRegistry::new()
            .with_strategy(Arc::new(PointsStrategy::new(ledger.clone())))
            .with_strategy(Arc::new(CardStrategy::new(gateways)));
        Fixture {
            orchestrator: Orchestrator::new(strategies, settlements.clone()),
            ledger,
            settlements,
            toss,
        }
    }

    fn request(legs: Vec<Leg>) -> PaymentRequest {
        PaymentRequest {
            order_id: OrderId::new("O1"),
            account_id: AccountId::new("m1"),
            total_amount: legs.iter().map(|l| l.amount).sum(),
            legs,
            use_points: 0,
            provider: None,
            auth: AuthPayload::new().with("paymentKey", "pk"),
        }
    }

    #[tokio::test]
    async fn test_all_legs_commit_and_persist() {
        let f = fixture(1000, MockGateway::named("TOSS").approve_with("T1"));
        let receipt = f
            .orchestrator
            .process_payment(&request(vec![
                Leg::new(PaymentMethod::Card, 14000),
                Leg::new(PaymentMethod::Points, 1000),
            ]))
            .await
            .unwrap();

        assert_eq!(receipt.processed_amount, 15000);
        assert_eq!(receipt.leg_count, 2);
        assert_eq!(f.ledger.balance("m1"), Some(0));

        let rows = f.settlements.all();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].transaction_id.as_deref(), Some("T1"));
        assert_eq!(rows[1].method, PaymentMethod::Points);
    }

    #[tokio::test]
    async fn test_gateway_failure_compensates_points() {
        let f = fixture(
            1000,
            MockGateway::named("TOSS").fail_approval(GatewayError::Timeout),
        );
        let err = f
            .orchestrator
            .process_payment(&request(vec![
                Leg::new(PaymentMethod::Points, 1000),
                Leg::new(PaymentMethod::Card, 14000),
            ]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PaymentError::LegFailed {
                method: PaymentMethod::Card,
                source: StrategyError::Gateway(GatewayError::Timeout),
                ref compensated,
            } if compensated == &vec![PaymentMethod::Points]
        ));
        assert_eq!(err.severity(), Severity::Failed);
        // The refunded USE still holds this order id.
        assert!(!err.is_retryable());
        assert_eq!(f.ledger.balance("m1"), Some(1000));
        assert_eq!(
            f.ledger
                .movements()
                .iter()
                .filter(|m| m.kind == MovementKind::Refund)
                .count(),
            1
        );
        assert!(f.settlements.all().is_empty());
    }

    #[tokio::test]
    async fn test_points_failure_cancels_card_in_reverse() {
        let f = fixture(10, MockGateway::named("TOSS").approve_with("T1"));
        let err = f
            .orchestrator
            .process_payment(&request(vec![
                Leg::new(PaymentMethod::Card, 14000),
                Leg::new(PaymentMethod::Points, 1000),
            ]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PaymentError::LegFailed {
                source: StrategyError::InsufficientBalance { .. },
                ..
            }
        ));
        assert_eq!(err.severity(), Severity::Failed);
        let cancels = f.toss.cancellations();
        assert_eq!(cancels.len(), 1);
        assert_eq!(cancels[0].transaction_id, "T1");
        assert!(f.settlements.all().is_empty());
    }

    #[tokio::test]
    async fn test_failed_compensation_is_fatal() {
        let f = fixture(
            1000,
            MockGateway::named("TOSS").fail_approval(GatewayError::Timeout),
        );
        f.ledger.fail_refunds(true);

        let err = f
            .orchestrator
            .process_payment(&request(vec![
                Leg::new(PaymentMethod::Points, 1000),
                Leg::new(PaymentMethod::Card, 14000),
            ]))
            .await
            .unwrap_err();

        match &err {
            PaymentError::CompensationFailure { faults, cause, .. } => {
                assert_eq!(faults.len(), 1);
                assert_eq!(faults[0].outcome.method, PaymentMethod::Points);
                assert!(matches!(cause, StrategyError::Gateway(GatewayError::Timeout)));
            }
            other => panic!("Expected CompensationFailure, got {:?}", other),
        }
        assert_eq!(err.severity(), Severity::Fatal);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_persistence_failure_is_fatal() {
        let f = fixture(1000, MockGateway::named("TOSS"));
        f.settlements.fail_saves(true);

        let err = f
            .orchestrator
            .process_payment(&request(vec![Leg::new(PaymentMethod::Points, 1000)]))
            .await
            .unwrap_err();

        match &err {
            PaymentError::PersistenceFailure { committed, .. } => assert_eq!(committed.len(), 1),
            other => panic!("Expected PersistenceFailure, got {:?}", other),
        }
        assert_eq!(err.severity(), Severity::Fatal);
        // No automatic reversal of committed legs.
        assert_eq!(f.ledger.balance("m1"), Some(0));
    }

    #[tokio::test]
    async fn test_validation_failure_has_no_side_effects() {
        let f = fixture(1000, MockGateway::named("TOSS"));
        let mut req = request(vec![Leg::new(PaymentMethod::Points, 1000)]);
        req.total_amount = 999;

        let err = f.orchestrator.process_payment(&req).await.unwrap_err();
        assert!(matches!(
            err,
            PaymentError::Validation(ValidationError::AmountMismatch { .. })
        ));
        assert_eq!(f.ledger.balance("m1"), Some(1000));
        assert!(f.ledger.movements().is_empty());
    }

    #[tokio::test]
    async fn test_overflowing_legs_rejected_before_execution() {
        let f = fixture(1000, MockGateway::named("TOSS"));
        let mut req = request(vec![
            Leg::new(PaymentMethod::Card, i64::MAX),
            Leg::new(PaymentMethod::Points, 1),
        ]);
        req.total_amount = i64::MAX;

        let err = f.orchestrator.process_payment(&req).await.unwrap_err();
        assert!(matches!(
            err,
            PaymentError::Validation(ValidationError::AmountOverflow)
        ));
        assert_eq!(err.severity(), Severity::Rejected);
        assert_eq!(f.ledger.balance("m1"), Some(1000));
        assert!(f.ledger.movements().is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_method_rejected_before_execution() {
        let ledger = Arc::new(MemoryLedger::new().with_account("m1", 1000));
        let strategies =
            StrategyRegistry::new().with_strategy(Arc::new(PointsStrategy::new(ledger.clone())));
        let orchestrator = Orchestrator::new(strategies, Arc::new(MemorySettlements::new()));

        let err = orchestrator
            .process_payment(&request(vec![
                Leg::new(PaymentMethod::Points, 1000),
                Leg::new(PaymentMethod::Card, 500),
            ]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::LegFailed {
                source: StrategyError::UnsupportedMethod(PaymentMethod::Card),
                ..
            }
        ));
        assert_eq!(ledger.balance("m1"), Some(1000));
    }

    #[tokio::test]
    async fn test_cancel_settlement_twice() {
        let f = fixture(1000, MockGateway::named("TOSS"));
        let receipt = f
            .orchestrator
            .process_payment(&request(vec![Leg::new(PaymentMethod::Points, 1000)]))
            .await
            .unwrap();
        let id = receipt.leg_results[0].settlement_id;

        let cancelled = f.orchestrator.cancel_settlement(id).await.unwrap();
        assert_eq!(cancelled.cancelled_amount, 1000);
        assert_eq!(f.ledger.balance("m1"), Some(1000));

        let err = f.orchestrator.cancel_settlement(id).await.unwrap_err();
        assert!(matches!(err, PaymentError::AlreadyCancelled { .. }));
        assert_eq!(f.settlements.all().len(), 2);

        assert!(matches!(
            f.orchestrator.cancel_settlement(cancelled.cancel_settlement_id).await,
            Err(PaymentError::NotCancellable(_))
        ));
        assert!(matches!(
            f.orchestrator.cancel_settlement(999).await,
            Err(PaymentError::SettlementNotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_order_views_mark_cancelled_leg() {
        let f = fixture(1000, MockGateway::named("TOSS").approve_with("T1"));
        let receipt = f
            .orchestrator
            .process_payment(&request(vec![
                Leg::new(PaymentMethod::Card, 500),
                Leg::new(PaymentMethod::Points, 1000),
            ]))
            .await
            .unwrap();
        let card_id = receipt.leg_results[0].settlement_id;
        f.orchestrator.cancel_settlement(card_id).await.unwrap();

        let views = f
            .orchestrator
            .order_settlements(&OrderId::new("O1"))
            .await
            .unwrap();
        assert_eq!(views.len(), 2);
        let card = views
            .iter()
            .find(|v| v.record.method == PaymentMethod::Card)
            .unwrap();
        assert!(card.cancelled);

        assert!(matches!(
            f.orchestrator.order_settlements(&OrderId::new("nope")).await,
            Err(PaymentError::OrderNotFound(_))
        ));
        assert_eq!(
            f.orchestrator
                .account_settlements(&AccountId::new("m1"))
                .await
                .unwrap()
                .len(),
            2
        );
    }
}

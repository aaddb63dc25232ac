//! Points leg: debits and refunds against the internal ledger.

use super::{CancelRequest, PaymentContext, PaymentStrategy, StrategyError};
use crate::domain::{Leg, LegOutcome, MovementKind, PaymentMethod};
use crate::store::LedgerStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub struct PointsStrategy {
    ledger: Arc<dyn LedgerStore>,
}

impl PointsStrategy {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl PaymentStrategy for PointsStrategy {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Points
    }

    async fn process_payment(
        &self,
        ctx: &PaymentContext,
        leg: &Leg,
    ) -> Result<LegOutcome, StrategyError> {
        let account = self.ledger.get_account(&ctx.account_id).await?;
        if !account.can_cover(leg.amount) {
            return Err(StrategyError::InsufficientBalance {
                balance: account.balance,
                requested: leg.amount,
            });
        }

        let movement = self
            .ledger
            .debit(&ctx.account_id, leg.amount, &ctx.order_id)
            .await?;

        info!(
            order_id = %ctx.order_id,
            account_id = %ctx.account_id,
            amount = leg.amount,
            "Points used"
        );

        Ok(LegOutcome {
            method: PaymentMethod::Points,
            order_id: ctx.order_id.clone(),
            amount: leg.amount,
            transaction_id: None,
            provider: None,
            raw: serde_json::json!({ "movementId": movement.id }),
        })
    }

    async fn cancel_payment(&self, request: &CancelRequest) -> Result<LegOutcome, StrategyError> {
        let used = self
            .ledger
            .find_movement(&request.order_id, MovementKind::Use)
            .await?
            .ok_or_else(|| StrategyError::NothingToCancel(request.order_id.clone()))?;

        if self
            .ledger
            .find_movement(&request.order_id, MovementKind::Refund)
            .await?
            .is_some()
        {
            return Err(StrategyError::AlreadyCancelled(request.order_id.clone()));
        }

        if request.amount != used.amount {
            return Err(StrategyError::AmountMismatch {
                expected: used.amount,
                actual: request.amount,
            });
        }

        if used.account_id != request.account_id {
            warn!(
                order_id = %request.order_id,
                requested = %request.account_id,
                owner = %used.account_id,
                "Refunding points to the account that used them"
            );
        }

        let refund = self
            .ledger
            .refund(&used.account_id, used.amount, &request.order_id)
            .await?;

        info!(
            order_id = %request.order_id,
            account_id = %used.account_id,
            amount = used.amount,
            reason = %request.reason,
            "Points refunded"
        );

        Ok(LegOutcome {
            method: PaymentMethod::Points,
            order_id: request.order_id.clone(),
            amount: used.amount,
            transaction_id: None,
            provider: None,
            raw: serde_json::json!({ "movementId": refund.id }),
        })
    }

    async fn perform_net_cancellation(
        &self,
        ctx: &PaymentContext,
        outcome: &LegOutcome,
    ) -> Result<(), StrategyError> {
        self.cancel_payment(&CancelRequest::compensating(ctx, outcome))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountId, AuthPayload, OrderId};
    use crate::store::MemoryLedger;

    fn ctx(order: &str) -> PaymentContext {
        PaymentContext {
            order_id: OrderId::new(order),
            account_id: AccountId::new("m1"),
            provider: None,
            auth: AuthPayload::new(),
        }
    }

    fn cancel(order: &str, amount: i64) -> CancelRequest {
        CancelRequest {
            order_id: OrderId::new(order),
            account_id: AccountId::new("m1"),
            amount,
            transaction_id: None,
            provider: None,
            reason: "customer request".to_string(),
        }
    }

    fn setup(balance: i64) -> (Arc<MemoryLedger>, PointsStrategy) {
        let ledger = Arc::new(MemoryLedger::new().with_account("m1", balance));
        let strategy = PointsStrategy::new(ledger.clone());
        (ledger, strategy)
    }

    #[tokio::test]
    async fn test_process_payment_debits_balance() {
        let (ledger, strategy) = setup(1000);
        let outcome = strategy
            .process_payment(&ctx("O1"), &Leg::new(PaymentMethod::Points, 1000))
            .await
            .unwrap();

        assert_eq!(outcome.transaction_id, None);
        assert_eq!(ledger.balance("m1"), Some(0));
        assert_eq!(ledger.movements()[0].kind, MovementKind::Use);
    }

    #[tokio::test]
    async fn test_insufficient_balance_leaves_ledger_untouched() {
        let (ledger, strategy) = setup(500);
        let result = strategy
            .process_payment(&ctx("O1"), &Leg::new(PaymentMethod::Points, 501))
            .await;

        assert!(matches!(
            result,
            Err(StrategyError::InsufficientBalance {
                balance: 500,
                requested: 501
            })
        ));
        assert_eq!(ledger.balance("m1"), Some(500));
        assert!(ledger.movements().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let ledger = Arc::new(MemoryLedger::new());
        let strategy = PointsStrategy::new(ledger);
        assert!(matches!(
            strategy
                .process_payment(&ctx("O1"), &Leg::new(PaymentMethod::Points, 1))
                .await,
            Err(StrategyError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let (ledger, strategy) = setup(1000);
        assert!(matches!(
            strategy.cancel_payment(&cancel("O1", 400)).await,
            Err(StrategyError::NothingToCancel(_))
        ));

        strategy
            .process_payment(&ctx("O1"), &Leg::new(PaymentMethod::Points, 400))
            .await
            .unwrap();

        assert!(matches!(
            strategy.cancel_payment(&cancel("O1", 300)).await,
            Err(StrategyError::AmountMismatch {
                expected: 400,
                actual: 300
            })
        ));
        assert_eq!(ledger.balance("m1"), Some(600));

        strategy.cancel_payment(&cancel("O1", 400)).await.unwrap();
        assert_eq!(ledger.balance("m1"), Some(1000));

        assert!(matches!(
            strategy.cancel_payment(&cancel("O1", 400)).await,
            Err(StrategyError::AlreadyCancelled(_))
        ));
        assert_eq!(ledger.movements().len(), 2);
    }

    #[tokio::test]
    async fn test_net_cancellation_restores_balance() {
        let (ledger, strategy) = setup(1000);
        let ctx = ctx("O1");
        let outcome = strategy
            .process_payment(&ctx, &Leg::new(PaymentMethod::Points, 1000))
            .await
            .unwrap();

        strategy.perform_net_cancellation(&ctx, &outcome).await.unwrap();

        assert_eq!(ledger.balance("m1"), Some(1000));
        let refunds: Vec<_> = ledger
            .movements()
            .into_iter()
            .filter(|m| m.kind == MovementKind::Refund)
            .collect();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].amount, 1000);
    }
}

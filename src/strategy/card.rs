//! Card leg: approvals and cancellations through a provider adapter.

use super::{CancelRequest, PaymentContext, PaymentStrategy, StrategyError};
use crate::domain::{Leg, LegOutcome, PaymentMethod};
use crate::gateway::{
    ApprovalRequest, CancellationRequest, GatewayAdapter, GatewayRegistry, GatewayResult,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub struct CardStrategy {
    gateways: GatewayRegistry,
}

impl CardStrategy {
    pub fn new(gateways: GatewayRegistry) -> Self {
        Self { gateways }
    }

    fn adapter(&self, provider: Option<&str>) -> Result<Arc<dyn GatewayAdapter>, StrategyError> {
        let tag = self.gateways.effective_provider(provider);
        self.gateways
            .resolve(tag)
            .ok_or_else(|| StrategyError::UnsupportedProvider(tag.to_string()))
    }

    fn outcome(adapter: &dyn GatewayAdapter, result: GatewayResult) -> LegOutcome {
        LegOutcome {
            method: PaymentMethod::Card,
            order_id: result.order_id.clone(),
            amount: result.amount,
            transaction_id: Some(result.transaction_id.clone()),
            provider: Some(adapter.name().to_string()),
            raw: result.raw,
        }
    }

    async fn cancel(&self, request: &CancelRequest) -> Result<LegOutcome, StrategyError> {
        let transaction_id = request
            .transaction_id
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(StrategyError::MissingTransactionId)?;
        let adapter = self.adapter(request.provider.as_deref())?;

        let result = adapter
            .process_cancellation(&CancellationRequest {
                order_id: request.order_id.clone(),
                amount: request.amount,
                transaction_id: transaction_id.to_string(),
                reason: request.reason.clone(),
            })
            .await?;

        info!(
            order_id = %request.order_id,
            provider = adapter.name(),
            transaction_id,
            amount = request.amount,
            "Card payment cancelled"
        );
        Ok(Self::outcome(adapter.as_ref(), result))
    }
}

#[async_trait]
impl PaymentStrategy for CardStrategy {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Card
    }

    async fn process_payment(
        &self,
        ctx: &PaymentContext,
        leg: &Leg,
    ) -> Result<LegOutcome, StrategyError> {
        if ctx.auth.is_empty() {
            return Err(StrategyError::MissingAuthData("auth"));
        }
        let provider = self.gateways.effective_provider(ctx.provider.as_deref());
        let adapter = self.adapter(Some(provider))?;

        let result = adapter
            .process_approval(&ApprovalRequest {
                order_id: ctx.order_id.clone(),
                amount: leg.amount,
                provider: provider.to_string(),
                auth: ctx.auth.clone(),
            })
            .await?;

        info!(
            order_id = %ctx.order_id,
            provider = adapter.name(),
            transaction_id = %result.transaction_id,
            amount = leg.amount,
            "Card payment approved"
        );
        Ok(Self::outcome(adapter.as_ref(), result))
    }

    async fn cancel_payment(&self, request: &CancelRequest) -> Result<LegOutcome, StrategyError> {
        self.cancel(request).await
    }

    async fn perform_net_cancellation(
        &self,
        ctx: &PaymentContext,
        outcome: &LegOutcome,
    ) -> Result<(), StrategyError> {
        self.cancel(&CancelRequest::compensating(ctx, outcome))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountId, AuthPayload, OrderId};
    use crate::gateway::{GatewayError, MockGateway};
    use crate::strategy::NET_CANCEL_REASON;

    fn ctx(provider: Option<&str>, auth: AuthPayload) -> PaymentContext {
        PaymentContext {
            order_id: OrderId::new("O1"),
            account_id: AccountId::new("m1"),
            provider: provider.map(str::to_string),
            auth,
        }
    }

    fn registry(toss: &MockGateway) -> GatewayRegistry {
        GatewayRegistry::new("TOSS").with_adapter(Arc::new(toss.clone()))
    }

    #[tokio::test]
    async fn test_approval_uses_default_provider() {
        let toss = MockGateway::named("TOSS").approve_with("T1");
        let strategy = CardStrategy::new(registry(&toss));

        let outcome = strategy
            .process_payment(
                &ctx(None, AuthPayload::new().with("paymentKey", "pk")),
                &Leg::new(PaymentMethod::Card, 14000),
            )
            .await
            .unwrap();

        assert_eq!(outcome.transaction_id.as_deref(), Some("T1"));
        assert_eq!(outcome.provider.as_deref(), Some("TOSS"));
        assert_eq!(toss.approvals()[0].provider, "TOSS");
    }

    #[tokio::test]
    async fn test_missing_auth_and_unknown_provider() {
        let toss = MockGateway::named("TOSS");
        let strategy = CardStrategy::new(registry(&toss));
        let leg = Leg::new(PaymentMethod::Card, 100);

        assert!(matches!(
            strategy.process_payment(&ctx(None, AuthPayload::new()), &leg).await,
            Err(StrategyError::MissingAuthData(_))
        ));
        assert!(matches!(
            strategy
                .process_payment(&ctx(Some("KCP"), AuthPayload::new().with("k", "v")), &leg)
                .await,
            Err(StrategyError::UnsupportedProvider(p)) if p == "KCP"
        ));
        assert!(toss.approvals().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_failure_surfaces() {
        let toss = MockGateway::named("TOSS").fail_approval(GatewayError::Timeout);
        let strategy = CardStrategy::new(registry(&toss));
        let result = strategy
            .process_payment(
                &ctx(None, AuthPayload::new().with("paymentKey", "pk")),
                &Leg::new(PaymentMethod::Card, 100),
            )
            .await;
        assert!(matches!(result, Err(StrategyError::Gateway(GatewayError::Timeout))));
    }

    #[tokio::test]
    async fn test_cancel_requires_transaction_id() {
        let toss = MockGateway::named("TOSS");
        let strategy = CardStrategy::new(registry(&toss));
        let request = CancelRequest {
            order_id: OrderId::new("O1"),
            account_id: AccountId::new("m1"),
            amount: 100,
            transaction_id: Some("  ".to_string()),
            provider: Some("TOSS".to_string()),
            reason: "customer request".to_string(),
        };
        assert!(matches!(
            strategy.cancel_payment(&request).await,
            Err(StrategyError::MissingTransactionId)
        ));
        assert!(toss.cancellations().is_empty());
    }

    #[tokio::test]
    async fn test_net_cancellation_uses_system_reason() {
        let toss = MockGateway::named("TOSS").approve_with("T1");
        let strategy = CardStrategy::new(registry(&toss));
        let ctx = ctx(None, AuthPayload::new().with("paymentKey", "pk"));
        let outcome = strategy
            .process_payment(&ctx, &Leg::new(PaymentMethod::Card, 14000))
            .await
            .unwrap();

        strategy.perform_net_cancellation(&ctx, &outcome).await.unwrap();

        let cancels = toss.cancellations();
        assert_eq!(cancels.len(), 1);
        assert_eq!(cancels[0].transaction_id, "T1");
        assert_eq!(cancels[0].amount, 14000);
        assert_eq!(cancels[0].reason, NET_CANCEL_REASON);
    }
}

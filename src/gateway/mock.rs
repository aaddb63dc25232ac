//! Mock gateway for testing without network calls.

use super::{
    ApprovalRequest, CancellationRequest, GatewayAdapter, GatewayError, GatewayResult,
    ResponseCode,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Gateway that answers from preset outcomes and records every call.
///
/// Clones share the call log, so a test can keep one handle while the
/// registry owns another.
#[derive(Debug, Clone)]
pub struct MockGateway {
    name: &'static str,
    transaction_id: Option<String>,
    approval_error: Option<GatewayError>,
    cancellation_error: Option<GatewayError>,
    approvals: Arc<Mutex<Vec<ApprovalRequest>>>,
    cancellations: Arc<Mutex<Vec<CancellationRequest>>>,
}

impl MockGateway {
    /// Create a mock that approves and cancels everything under `name`.
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            transaction_id: None,
            approval_error: None,
            cancellation_error: None,
            approvals: Arc::new(Mutex::new(Vec::new())),
            cancellations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fixed transaction id for approvals. Defaults to `tx-<order id>`.
    pub fn approve_with(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn fail_approval(mut self, error: GatewayError) -> Self {
        self.approval_error = Some(error);
        self
    }

    pub fn fail_cancellation(mut self, error: GatewayError) -> Self {
        self.cancellation_error = Some(error);
        self
    }

    /// Approval requests received so far.
    pub fn approvals(&self) -> Vec<ApprovalRequest> {
        self.approvals.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Cancellation requests received so far.
    pub fn cancellations(&self) -> Vec<CancellationRequest> {
        self.cancellations
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    fn result(
        transaction_id: String,
        order_id: &crate::domain::OrderId,
        amount: i64,
    ) -> GatewayResult {
        GatewayResult {
            transaction_id: transaction_id.clone(),
            order_id: order_id.clone(),
            amount,
            response_code: ResponseCode::Success,
            provider_code: Some("0000".to_string()),
            success: true,
            raw: serde_json::json!({ "tid": transaction_id, "mock": true }),
            approval_number: None,
            approved_at: None,
        }
    }
}

#[async_trait]
impl GatewayAdapter for MockGateway {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports(&self, provider: &str) -> bool {
        provider.to_ascii_uppercase().contains(self.name)
    }

    async fn process_approval(
        &self,
        request: &ApprovalRequest,
    ) -> Result<GatewayResult, GatewayError> {
        if let Ok(mut calls) = self.approvals.lock() {
            calls.push(request.clone());
        }
        if let Some(err) = &self.approval_error {
            return Err(err.clone());
        }
        let transaction_id = self
            .transaction_id
            .clone()
            .unwrap_or_else(|| format!("tx-{}", request.order_id));
        Ok(Self::result(transaction_id, &request.order_id, request.amount))
    }

    async fn process_cancellation(
        &self,
        request: &CancellationRequest,
    ) -> Result<GatewayResult, GatewayError> {
        if let Ok(mut calls) = self.cancellations.lock() {
            calls.push(request.clone());
        }
        if let Some(err) = &self.cancellation_error {
            return Err(err.clone());
        }
        Ok(Self::result(
            request.transaction_id.clone(),
            &request.order_id,
            request.amount,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuthPayload, OrderId};

    fn approval(order: &str) -> ApprovalRequest {
        ApprovalRequest {
            order_id: OrderId::new(order),
            amount: 5000,
            provider: "TOSS".to_string(),
            auth: AuthPayload::new().with("paymentKey", "pk"),
        }
    }

    #[tokio::test]
    async fn test_mock_gateway_approves_and_records() {
        let mock = MockGateway::named("TOSS");
        let handle = mock.clone();
        let result = mock.process_approval(&approval("O1")).await.unwrap();
        assert_eq!(result.transaction_id, "tx-O1");
        assert_eq!(result.amount, 5000);
        assert_eq!(handle.approvals().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_gateway_fails_on_demand() {
        let mock = MockGateway::named("TOSS").fail_approval(GatewayError::Timeout);
        assert_eq!(
            mock.process_approval(&approval("O1")).await,
            Err(GatewayError::Timeout)
        );
        assert_eq!(mock.approvals().len(), 1);
        assert!(mock.cancellations().is_empty());
    }
}

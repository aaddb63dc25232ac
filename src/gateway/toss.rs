//! Toss Payments adapter (v1 API).

use super::http::{first_str, CallInfo, GatewayHttp, HttpReply};
use super::{ApprovalRequest, CancellationRequest, GatewayAdapter, GatewayError, GatewayResult};
use async_trait::async_trait;
use tracing::info;

const PROVIDER: &str = "TOSS";

#[derive(Debug, Clone)]
pub struct TossSettings {
    pub api_key: String,
    pub execute_url: String,
    /// Contains a `{paymentKey}` placeholder.
    pub cancel_url: String,
}

/// Toss uses the client-side `paymentKey` as its transaction id.
#[derive(Debug, Clone)]
pub struct TossAdapter {
    http: GatewayHttp,
    settings: TossSettings,
}

impl TossAdapter {
    pub fn new(http: GatewayHttp, settings: TossSettings) -> Self {
        Self { http, settings }
    }

    fn cancel_url(&self, payment_key: &str) -> String {
        self.settings.cancel_url.replace("{paymentKey}", payment_key)
    }

    /// Toss signals refusal either through a non-2xx status (handled by the
    /// exchange) or through an error `code` / unexpected `status` in the body.
    fn business_outcome(body: &serde_json::Value, accepted: &[&str]) -> Result<(), GatewayError> {
        if let Some(status) = body.get("status").and_then(|v| v.as_str()) {
            if accepted.contains(&status) {
                return Ok(());
            }
            return Err(GatewayError::Declined {
                code: status.to_string(),
                message: first_str(body, &["message"]).unwrap_or_default(),
            });
        }
        if let Some(code) = first_str(body, &["code"]) {
            return Err(GatewayError::Declined {
                code,
                message: first_str(body, &["message"]).unwrap_or_default(),
            });
        }
        Ok(())
    }

    fn finish(
        &self,
        reply: HttpReply,
        accepted: &[&str],
        transaction_id: String,
        order_id: &crate::domain::OrderId,
        amount: i64,
    ) -> Result<GatewayResult, GatewayError> {
        let outcome = Self::business_outcome(&reply.body, accepted);
        self.http.finish(&reply, &outcome);
        outcome?;

        let approval_number = reply
            .body
            .get("card")
            .and_then(|c| first_str(c, &["approveNo"]))
            .or_else(|| first_str(&reply.body, &["approvalNumber"]));

        Ok(GatewayResult {
            transaction_id,
            order_id: order_id.clone(),
            amount,
            response_code: reply.code,
            provider_code: first_str(&reply.body, &["status"]),
            success: true,
            approved_at: first_str(&reply.body, &["approvedAt"]),
            approval_number,
            raw: reply.body,
        })
    }
}

#[async_trait]
impl GatewayAdapter for TossAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn supports(&self, provider: &str) -> bool {
        provider.to_ascii_uppercase().contains(PROVIDER)
    }

    async fn process_approval(
        &self,
        request: &ApprovalRequest,
    ) -> Result<GatewayResult, GatewayError> {
        let payment_key = request
            .auth
            .get("paymentKey")
            .ok_or(GatewayError::MissingField("paymentKey"))?;

        let payload = serde_json::json!({
            "paymentKey": payment_key,
            "amount": request.amount,
            "orderId": request.order_id.as_str(),
        });

        let builder = self
            .http
            .client()
            .post(&self.settings.execute_url)
            .basic_auth(&self.settings.api_key, None::<&str>)
            .json(&payload);

        let reply = self
            .http
            .exchange(
                CallInfo {
                    provider: PROVIDER,
                    api: "confirm",
                    url: &self.settings.execute_url,
                    order_id: &request.order_id,
                },
                payload.clone(),
                builder,
            )
            .await?;

        let transaction_id =
            first_str(&reply.body, &["paymentKey"]).unwrap_or_else(|| payment_key.to_string());
        let result = self.finish(
            reply,
            &["DONE"],
            transaction_id,
            &request.order_id,
            request.amount,
        )?;

        info!(
            order_id = %request.order_id,
            transaction_id = %result.transaction_id,
            amount = request.amount,
            "Toss approval completed"
        );
        Ok(result)
    }

    async fn process_cancellation(
        &self,
        request: &CancellationRequest,
    ) -> Result<GatewayResult, GatewayError> {
        if request.transaction_id.trim().is_empty() {
            return Err(GatewayError::MissingField("paymentKey"));
        }

        let url = self.cancel_url(&request.transaction_id);
        let payload = serde_json::json!({ "cancelReason": request.reason });

        let builder = self
            .http
            .client()
            .post(&url)
            .basic_auth(&self.settings.api_key, None::<&str>)
            .json(&payload);

        let reply = self
            .http
            .exchange(
                CallInfo {
                    provider: PROVIDER,
                    api: "cancel",
                    url: &url,
                    order_id: &request.order_id,
                },
                payload.clone(),
                builder,
            )
            .await?;

        let result = self.finish(
            reply,
            &["CANCELED", "PARTIAL_CANCELED"],
            request.transaction_id.clone(),
            &request.order_id,
            request.amount,
        )?;

        info!(
            order_id = %request.order_id,
            transaction_id = %request.transaction_id,
            amount = request.amount,
            "Toss cancellation completed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_outcome_accepts_expected_status() {
        let body = serde_json::json!({"status": "DONE", "paymentKey": "pk"});
        assert!(TossAdapter::business_outcome(&body, &["DONE"]).is_ok());
    }

    #[test]
    fn test_business_outcome_rejects_other_status() {
        let body = serde_json::json!({"status": "ABORTED", "message": "nope"});
        match TossAdapter::business_outcome(&body, &["DONE"]) {
            Err(GatewayError::Declined { code, message }) => {
                assert_eq!(code, "ABORTED");
                assert_eq!(message, "nope");
            }
            other => panic!("Expected Declined, got {:?}", other),
        }
    }

    #[test]
    fn test_business_outcome_error_code_without_status() {
        let body = serde_json::json!({"code": "REJECT_CARD_COMPANY", "message": "limit"});
        assert!(matches!(
            TossAdapter::business_outcome(&body, &["DONE"]),
            Err(GatewayError::Declined { .. })
        ));
    }

    #[test]
    fn test_business_outcome_bare_2xx_is_success() {
        let body = serde_json::json!({"rawResponse": ""});
        assert!(TossAdapter::business_outcome(&body, &["DONE"]).is_ok());
    }
}

//! KG Inicis adapter: standard-payment approval and the v2 refund API.

use super::http::{first_str, CallInfo, GatewayHttp};
use super::signature::{inicis_refund_hash, inicis_signature, inicis_verification};
use super::{ApprovalRequest, CancellationRequest, GatewayAdapter, GatewayError, GatewayResult};
use crate::domain::TimeMs;
use async_trait::async_trait;
use tracing::info;

const PROVIDER: &str = "INICIS";
const AUTH_SUCCESS: &str = "0000";
const REFUND_TYPE: &str = "refund";

#[derive(Debug, Clone)]
pub struct InicisSettings {
    pub mid: String,
    pub sign_key: String,
    pub api_key: String,
    pub refund_url: String,
    pub charset: String,
    pub format: String,
    pub client_ip: String,
}

#[derive(Debug, Clone)]
pub struct InicisAdapter {
    http: GatewayHttp,
    settings: InicisSettings,
}

impl InicisAdapter {
    pub fn new(http: GatewayHttp, settings: InicisSettings) -> Self {
        Self { http, settings }
    }

    /// Signed approval form, in the field order Inicis documents.
    pub fn approval_form(&self, auth_token: &str, timestamp: &str) -> Vec<(&'static str, String)> {
        vec![
            ("mid", self.settings.mid.clone()),
            ("authToken", auth_token.to_string()),
            ("timestamp", timestamp.to_string()),
            ("signature", inicis_signature(auth_token, timestamp)),
            (
                "verification",
                inicis_verification(auth_token, &self.settings.sign_key, timestamp),
            ),
            ("charset", self.settings.charset.clone()),
            ("format", self.settings.format.clone()),
        ]
    }

    /// Signed refund body. `hashData` covers the exact serialized `data`.
    pub fn refund_body(
        &self,
        transaction_id: &str,
        reason: &str,
        timestamp: &str,
    ) -> Result<serde_json::Value, GatewayError> {
        let data = serde_json::json!({ "msg": reason, "tid": transaction_id });
        let data_json =
            serde_json::to_string(&data).map_err(|e| GatewayError::Encode(e.to_string()))?;
        let hash = inicis_refund_hash(
            &self.settings.api_key,
            &self.settings.mid,
            REFUND_TYPE,
            timestamp,
            &data_json,
        );

        Ok(serde_json::json!({
            "mid": self.settings.mid,
            "type": REFUND_TYPE,
            "timestamp": timestamp,
            "clientIp": self.settings.client_ip,
            "hashData": hash,
            "data": data,
        }))
    }

    fn business_outcome(body: &serde_json::Value, accepted: &[&str]) -> Result<(), GatewayError> {
        let code = first_str(body, &["resultCode", "code"]).unwrap_or_default();
        if accepted.contains(&code.as_str()) {
            Ok(())
        } else {
            Err(GatewayError::Declined {
                code: if code.is_empty() { "9999".to_string() } else { code },
                message: first_str(body, &["resultMsg", "message"]).unwrap_or_default(),
            })
        }
    }
}

#[async_trait]
impl GatewayAdapter for InicisAdapter {
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
        let auth_code = request
            .auth
            .get("resultCode")
            .ok_or(GatewayError::MissingField("resultCode"))?;
        if auth_code != AUTH_SUCCESS {
            return Err(GatewayError::Declined {
                code: auth_code.to_string(),
                message: "authentication step failed".to_string(),
            });
        }
        let auth_url = request
            .auth
            .get("authUrl")
            .ok_or(GatewayError::MissingField("authUrl"))?;
        let auth_token = request
            .auth
            .get("authToken")
            .ok_or(GatewayError::MissingField("authToken"))?;

        let timestamp = TimeMs::now().as_ms().to_string();
        let form = self.approval_form(auth_token, &timestamp);
        let audit_request = serde_json::Value::Object(
            form.iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
                .collect(),
        );

        let builder = self.http.client().post(auth_url).form(&form);
        let reply = self
            .http
            .exchange(
                CallInfo {
                    provider: PROVIDER,
                    api: "confirm",
                    url: auth_url,
                    order_id: &request.order_id,
                },
                audit_request,
                builder,
            )
            .await?;

        let outcome = Self::business_outcome(&reply.body, &[AUTH_SUCCESS]).and_then(|_| {
            first_str(&reply.body, &["tid", "TID", "P_TID"])
                .map(|_| ())
                .ok_or(GatewayError::MissingTransactionId)
        });
        self.http.finish(&reply, &outcome);
        outcome?;

        let transaction_id = first_str(&reply.body, &["tid", "TID", "P_TID"])
            .ok_or(GatewayError::MissingTransactionId)?;

        info!(
            order_id = %request.order_id,
            transaction_id = %transaction_id,
            amount = request.amount,
            "Inicis approval completed"
        );

        Ok(GatewayResult {
            transaction_id,
            order_id: request.order_id.clone(),
            amount: request.amount,
            response_code: reply.code,
            provider_code: first_str(&reply.body, &["resultCode"]),
            success: true,
            approval_number: first_str(&reply.body, &["applNum", "approvalNumber"]),
            approved_at: first_str(&reply.body, &["applDate", "approvedAt"]),
            raw: reply.body,
        })
    }

    async fn process_cancellation(
        &self,
        request: &CancellationRequest,
    ) -> Result<GatewayResult, GatewayError> {
        if request.transaction_id.trim().is_empty() {
            return Err(GatewayError::MissingField("tid"));
        }

        let timestamp = chrono::Local::now().format("%Y%m%d%H%M%S").to_string();
        let body = self.refund_body(&request.transaction_id, &request.reason, &timestamp)?;

        let builder = self
            .http
            .client()
            .post(&self.settings.refund_url)
            .json(&body);
        let reply = self
            .http
            .exchange(
                CallInfo {
                    provider: PROVIDER,
                    api: "cancel",
                    url: &self.settings.refund_url,
                    order_id: &request.order_id,
                },
                body.clone(),
                builder,
            )
            .await?;

        // The refund API answers "00"; older endpoints answer "0000".
        let outcome = Self::business_outcome(&reply.body, &["00", AUTH_SUCCESS]);
        self.http.finish(&reply, &outcome);
        outcome?;

        info!(
            order_id = %request.order_id,
            transaction_id = %request.transaction_id,
            amount = request.amount,
            "Inicis cancellation completed"
        );

        Ok(GatewayResult {
            transaction_id: request.transaction_id.clone(),
            order_id: request.order_id.clone(),
            amount: request.amount,
            response_code: reply.code,
            provider_code: first_str(&reply.body, &["resultCode"]),
            success: true,
            approval_number: None,
            approved_at: first_str(&reply.body, &["cancelDate"]),
            raw: reply.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NoopAuditRecorder;
    use crate::gateway::signature::sha512_hex;
    use std::sync::Arc;
    use std::time::Duration;

    fn adapter() -> InicisAdapter {
        let http = GatewayHttp::new(Duration::from_secs(1), Arc::new(NoopAuditRecorder)).unwrap();
        InicisAdapter::new(
            http,
            InicisSettings {
                mid: "INIpayTest".to_string(),
                sign_key: "SU5JTElURV9UUklQTEVERVNfS0VZRA==".to_string(),
                api_key: "ItEQKi3rY7uvDS8l".to_string(),
                refund_url: "http://127.0.0.1:9/refund".to_string(),
                charset: "UTF-8".to_string(),
                format: "JSON".to_string(),
                client_ip: "127.0.0.1".to_string(),
            },
        )
    }

    #[test]
    fn test_approval_form_field_order() {
        let form = adapter().approval_form("tok", "1700000000000");
        let keys: Vec<&str> = form.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec!["mid", "authToken", "timestamp", "signature", "verification", "charset", "format"]
        );
        assert_eq!(form[3].1, inicis_signature("tok", "1700000000000"));
    }

    #[test]
    fn test_refund_body_hash_covers_serialized_data() {
        let body = adapter()
            .refund_body("T1", "cancel", "20240101120000")
            .unwrap();
        let expected = sha512_hex(
            r#"ItEQKi3rY7uvDS8lINIpayTestrefund20240101120000{"msg":"cancel","tid":"T1"}"#,
        );
        assert_eq!(body["hashData"], expected);
        assert_eq!(body["type"], "refund");
        assert_eq!(body["data"]["tid"], "T1");
    }

    #[test]
    fn test_business_outcome_codes() {
        let ok = serde_json::json!({"resultCode": "0000", "tid": "T1"});
        assert!(InicisAdapter::business_outcome(&ok, &[AUTH_SUCCESS]).is_ok());

        let refused = serde_json::json!({"resultCode": "V013", "resultMsg": "limit"});
        match InicisAdapter::business_outcome(&refused, &[AUTH_SUCCESS]) {
            Err(GatewayError::Declined { code, message }) => {
                assert_eq!(code, "V013");
                assert_eq!(message, "limit");
            }
            other => panic!("Expected Declined, got {:?}", other),
        }

        let silent = serde_json::json!({});
        assert!(matches!(
            InicisAdapter::business_outcome(&silent, &[AUTH_SUCCESS]),
            Err(GatewayError::Declined { code, .. }) if code == "9999"
        ));
    }

    #[tokio::test]
    async fn test_approval_rejects_failed_auth_step() {
        let request = ApprovalRequest {
            order_id: crate::domain::OrderId::new("O1"),
            amount: 1000,
            provider: "INICIS".to_string(),
            auth: crate::domain::AuthPayload::new()
                .with("resultCode", "V001")
                .with("authUrl", "http://127.0.0.1:9/auth")
                .with("authToken", "tok"),
        };
        assert!(matches!(
            adapter().process_approval(&request).await,
            Err(GatewayError::Declined { code, .. }) if code == "V001"
        ));
    }

    #[tokio::test]
    async fn test_approval_requires_auth_token() {
        let request = ApprovalRequest {
            order_id: crate::domain::OrderId::new("O1"),
            amount: 1000,
            provider: "INICIS".to_string(),
            auth: crate::domain::AuthPayload::new()
                .with("resultCode", "0000")
                .with("authUrl", "http://127.0.0.1:9/auth"),
        };
        assert_eq!(
            adapter().process_approval(&request).await,
            Err(GatewayError::MissingField("authToken"))
        );
    }
}

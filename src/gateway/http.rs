//! Shared HTTP exchange for provider adapters: send, classify, parse, audit.

use super::{GatewayError, ResponseCode};
use crate::audit::{AuditCall, AuditHandle, AuditRecorder, UNKNOWN_FAILURE_CODE};
use crate::domain::OrderId;
use reqwest::{Client, RequestBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP client plus the audit recorder every provider call reports to.
#[derive(Debug, Clone)]
pub struct GatewayHttp {
    client: Client,
    audit: Arc<dyn AuditRecorder>,
}

/// A 2xx response, parsed.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub handle: AuditHandle,
    pub status: u16,
    pub code: ResponseCode,
    pub body: serde_json::Value,
}

/// Metadata of the call being made, used for the interface history.
#[derive(Debug, Clone, Copy)]
pub struct CallInfo<'a> {
    pub provider: &'a str,
    pub api: &'a str,
    pub url: &'a str,
    pub order_id: &'a OrderId,
}

impl GatewayHttp {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(timeout: Duration, audit: Arc<dyn AuditRecorder>) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        Ok(Self { client, audit })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send `builder`, recording the call. Non-2xx and transport failures are
    /// recorded here; 2xx replies are recorded by [`GatewayHttp::finish`] once
    /// the adapter has judged the business outcome.
    pub async fn exchange(
        &self,
        info: CallInfo<'_>,
        request_for_audit: serde_json::Value,
        builder: RequestBuilder,
    ) -> Result<HttpReply, GatewayError> {
        let handle = self.audit.record_request_start(AuditCall {
            provider: info.provider.to_string(),
            api: info.api.to_string(),
            url: info.url.to_string(),
            request: request_for_audit,
            order_id: info.order_id.clone(),
        });

        debug!(
            provider = info.provider,
            api = info.api,
            order_id = %info.order_id,
            "Calling provider"
        );

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                let err = if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Network(e.to_string())
                };
                warn!(provider = info.provider, api = info.api, error = %err, "Provider call failed");
                self.audit
                    .record_failure(handle, None, UNKNOWN_FAILURE_CODE, None, &err.to_string());
                return Err(err);
            }
        };

        let status = response.status().as_u16();
        let code = ResponseCode::from_http_status(status);
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                let err = if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Network(e.to_string())
                };
                self.audit
                    .record_failure(handle, None, code.as_code(), Some(status), &err.to_string());
                return Err(err);
            }
        };

        if code != ResponseCode::Success {
            let err = GatewayError::Http {
                status,
                code,
                body: text.clone(),
            };
            warn!(provider = info.provider, api = info.api, status, "Provider returned an error status");
            self.audit
                .record_failure(handle, Some(&text), code.as_code(), Some(status), &err.to_string());
            return Err(err);
        }

        Ok(HttpReply {
            handle,
            status,
            code,
            body: parse_body(&text),
        })
    }

    /// Record the business outcome of a 2xx reply.
    pub fn finish(&self, reply: &HttpReply, outcome: &Result<(), GatewayError>) {
        match outcome {
            Ok(()) => self.audit.record_success(reply.handle, &reply.body, reply.status),
            Err(e) => {
                let provider_code = match e {
                    GatewayError::Declined { code, .. } => code.as_str(),
                    _ => UNKNOWN_FAILURE_CODE,
                };
                self.audit.record_failure(
                    reply.handle,
                    Some(&reply.body.to_string()),
                    provider_code,
                    Some(reply.status),
                    &e.to_string(),
                );
            }
        }
    }
}

/// Parse a response body as a JSON object; otherwise keep the raw text under
/// `rawResponse` and lift any `k=v&k=v` pairs.
pub fn parse_body(text: &str) -> serde_json::Value {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(text) {
        return serde_json::Value::Object(map);
    }

    let mut map = serde_json::Map::new();
    map.insert(
        "rawResponse".to_string(),
        serde_json::Value::String(text.to_string()),
    );
    if text.contains('=') && text.contains('&') {
        for pair in text.split('&') {
            if let Some((k, v)) = pair.split_once('=') {
                map.insert(k.to_string(), serde_json::Value::String(v.to_string()));
            }
        }
    }
    serde_json::Value::Object(map)
}

/// First string (or number) value among `keys`.
pub fn first_str(body: &serde_json::Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match body.get(*k) {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

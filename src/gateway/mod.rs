//! Gateway abstraction over third-party payment networks.
//!
//! Each adapter turns a provider's wire protocol into a [`GatewayResult`] so
//! the card strategy never sees provider-specific response shapes.

use crate::domain::{AuthPayload, OrderId};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub mod http;
pub mod inicis;
pub mod mock;
pub mod signature;
pub mod toss;

pub use http::GatewayHttp;
pub use inicis::{InicisAdapter, InicisSettings};
pub use mock::MockGateway;
pub use toss::{TossAdapter, TossSettings};

/// Approval of one card leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub order_id: OrderId,
    pub amount: i64,
    pub provider: String,
    pub auth: AuthPayload,
}

/// Cancellation of an approved card leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationRequest {
    pub order_id: OrderId,
    pub amount: i64,
    pub transaction_id: String,
    pub reason: String,
}

/// HTTP outcome class, independent of the provider's business code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResponseCode {
    Success,
    ClientError,
    ServerError,
    Unknown,
}

impl ResponseCode {
    pub fn from_http_status(status: u16) -> Self {
        match status {
            200..=299 => ResponseCode::Success,
            400..=499 => ResponseCode::ClientError,
            500..=599 => ResponseCode::ServerError,
            _ => ResponseCode::Unknown,
        }
    }

    /// Four-digit code used in interface history.
    pub fn as_code(&self) -> &'static str {
        match self {
            ResponseCode::Success => "0000",
            ResponseCode::ClientError => "4000",
            ResponseCode::ServerError => "5000",
            ResponseCode::Unknown => "9999",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Normalized provider response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResult {
    pub transaction_id: String,
    pub order_id: OrderId,
    pub amount: i64,
    pub response_code: ResponseCode,
    /// The provider's own business result code, when it sent one.
    pub provider_code: Option<String>,
    pub success: bool,
    pub raw: serde_json::Value,
    pub approval_number: Option<String>,
    pub approved_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// A required authorization field was absent from the request.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP error {status} ({code}): {body}")]
    Http {
        status: u16,
        code: ResponseCode,
        body: String,
    },
    /// The provider answered but refused the operation.
    #[error("declined by provider ({code}): {message}")]
    Declined { code: String, message: String },
    #[error("response did not carry a transaction id")]
    MissingTransactionId,
    #[error("encode error: {0}")]
    Encode(String),
}

impl GatewayError {
    /// Whether retrying the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Timeout | GatewayError::Network(_) => true,
            GatewayError::Http { code, .. } => *code == ResponseCode::ServerError,
            _ => false,
        }
    }
}

/// A provider adapter.
#[async_trait]
pub trait GatewayAdapter: Send + Sync + fmt::Debug {
    /// Canonical provider tag (e.g. `TOSS`).
    fn name(&self) -> &'static str;

    /// Whether this adapter handles the given provider tag.
    fn supports(&self, provider: &str) -> bool;

    async fn process_approval(
        &self,
        request: &ApprovalRequest,
    ) -> Result<GatewayResult, GatewayError>;

    async fn process_cancellation(
        &self,
        request: &CancellationRequest,
    ) -> Result<GatewayResult, GatewayError>;
}

/// Ordered set of adapters resolved by provider tag.
#[derive(Debug, Clone)]
pub struct GatewayRegistry {
    adapters: Vec<Arc<dyn GatewayAdapter>>,
    default_provider: String,
}

impl GatewayRegistry {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            adapters: Vec::new(),
            default_provider: default_provider.into(),
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn GatewayAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Provider tag to use for a leg; blank tags fall back to the default.
    pub fn effective_provider<'a>(&'a self, provider: Option<&'a str>) -> &'a str {
        match provider.map(str::trim) {
            Some(p) if !p.is_empty() => p,
            _ => self.default_provider.as_str(),
        }
    }

    /// First adapter that supports `provider`.
    pub fn resolve(&self, provider: &str) -> Option<Arc<dyn GatewayAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.supports(provider))
            .cloned()
    }
}

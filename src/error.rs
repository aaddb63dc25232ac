use crate::orchestration::{PaymentError, Severity};
use crate::store::LedgerError;
use crate::strategy::StrategyError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AccountNotFound(id) => AppError::NotFound(format!("account {}", id)),
            LedgerError::InvalidAmount(_) => AppError::BadRequest(err.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

fn strategy_status(err: &StrategyError) -> StatusCode {
    match err {
        StrategyError::AccountNotFound(_) => StatusCode::NOT_FOUND,
        StrategyError::InsufficientBalance { .. }
        | StrategyError::AmountMismatch { .. }
        | StrategyError::NothingToCancel(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StrategyError::AlreadyCancelled(_) | StrategyError::DuplicateOrder(_) => {
            StatusCode::CONFLICT
        }
        StrategyError::UnsupportedMethod(_)
        | StrategyError::UnsupportedProvider(_)
        | StrategyError::MissingAuthData(_)
        | StrategyError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        StrategyError::Gateway(_) | StrategyError::MissingTransactionId => StatusCode::BAD_GATEWAY,
        StrategyError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// HTTP status for a payment failure.
pub fn payment_status(err: &PaymentError) -> StatusCode {
    if err.severity() == Severity::Fatal {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    match err {
        PaymentError::Validation(_) => StatusCode::BAD_REQUEST,
        PaymentError::SettlementNotFound(_) | PaymentError::OrderNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        PaymentError::AlreadyCancelled { .. } | PaymentError::NotCancellable(_) => {
            StatusCode::CONFLICT
        }
        PaymentError::LegFailed { source, .. } | PaymentError::CancelFailed(source) => {
            strategy_status(source)
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": msg }),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::Payment(err) => (
                payment_status(&err),
                json!({
                    "error": err.to_string(),
                    "severity": err.severity(),
                    "retryable": err.is_retryable(),
                }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

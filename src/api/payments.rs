use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{AccountId, OrderId, SettlementView};
use crate::error::AppError;
use crate::orchestration::{CancelReceipt, PaymentReceipt, PaymentRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBody {
    pub settlement_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementsResponse {
    pub count: usize,
    pub settlements: Vec<SettlementView>,
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<PaymentReceipt>, AppError> {
    let receipt = state.orchestrator.process_payment(&request).await?;
    Ok(Json(receipt))
}

pub async fn cancel_payment(
    State(state): State<AppState>,
    Json(body): Json<CancelBody>,
) -> Result<Json<CancelReceipt>, AppError> {
    let receipt = state
        .orchestrator
        .cancel_settlement(body.settlement_id)
        .await?;
    Ok(Json(receipt))
}

pub async fn get_order_settlements(
    Path(order_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SettlementsResponse>, AppError> {
    let settlements = state
        .orchestrator
        .order_settlements(&OrderId::new(order_id))
        .await?;
    Ok(Json(SettlementsResponse {
        count: settlements.len(),
        settlements,
    }))
}

pub async fn get_account_history(
    Path(account_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SettlementsResponse>, AppError> {
    let settlements = state
        .orchestrator
        .account_settlements(&AccountId::new(account_id))
        .await?;
    Ok(Json(SettlementsResponse {
        count: settlements.len(),
        settlements,
    }))
}

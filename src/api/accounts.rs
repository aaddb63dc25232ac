use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::api::AppState;
use crate::domain::{AccountId, LedgerMovement};
use crate::error::AppError;
use crate::store::LedgerStore;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsResponse {
    pub account_id: AccountId,
    pub balance: i64,
    pub updated_at: i64,
    pub movements: Vec<MovementDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementDto {
    pub id: i64,
    pub kind: String,
    pub amount: i64,
    pub signed_amount: i64,
    pub correlation_id: String,
    pub created_at: i64,
}

impl From<LedgerMovement> for MovementDto {
    fn from(m: LedgerMovement) -> Self {
        Self {
            id: m.id,
            kind: m.kind.to_string(),
            amount: m.amount,
            signed_amount: m.signed_amount(),
            correlation_id: m.correlation_id,
            created_at: m.created_at.as_ms(),
        }
    }
}

pub async fn get_points(
    Path(account_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PointsResponse>, AppError> {
    let account_id = AccountId::new(account_id);
    let account = state.repo.get_account(&account_id).await?;
    let movements = state
        .repo
        .list_movements(&account_id)
        .await?
        .into_iter()
        .map(MovementDto::from)
        .collect();

    Ok(Json(PointsResponse {
        account_id: account.account_id,
        balance: account.balance,
        updated_at: account.updated_at.as_ms(),
        movements,
    }))
}

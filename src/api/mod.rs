pub mod accounts;
pub mod health;
pub mod payments;

use crate::db::Repository;
use crate::orchestration::Orchestrator;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, orchestrator: Arc<Orchestrator>) -> Self {
        Self { repo, orchestrator }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/payments/confirm", post(payments::confirm_payment))
        .route("/v1/payments/cancel", post(payments::cancel_payment))
        .route(
            "/v1/payments/order/:order_id",
            get(payments::get_order_settlements),
        )
        .route(
            "/v1/payments/history/:account_id",
            get(payments::get_account_history),
        )
        .route(
            "/v1/accounts/:account_id/points",
            get(accounts::get_points),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod orchestration;
pub mod store;
pub mod strategy;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    AccountId, AuthPayload, Leg, LegOutcome, OrderId, PaymentMethod, SettlementRecord,
    SettlementView, TimeMs,
};
pub use error::AppError;
pub use orchestration::{Orchestrator, PaymentError, PaymentRequest};

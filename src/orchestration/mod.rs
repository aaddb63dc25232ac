pub mod legs;
pub mod orchestrator;

pub use legs::{expand_legacy, resolve_legs, validate_legs, PaymentRequest, ValidationError};
pub use orchestrator::{
    CancelReceipt, CompensationFault, LegReceipt, LegState, OrderState, Orchestrator,
    PaymentError, PaymentReceipt, Severity,
};

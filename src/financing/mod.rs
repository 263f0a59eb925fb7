//! Financing domain module
//!
//! Contains the loan request aggregate, the installment terms calculator,
//! the actor-scoped state machine, and the service that owns every mutation
//! of a loan request.

pub mod amortization;
mod model;
mod service;
pub mod transitions;

pub use amortization::{payment_terms, InvalidTerms, PaymentTerms};
pub use model::*;
pub use service::{FinancingError, FinancingService, HintOutcome, LoanBounds};
pub use transitions::{allowed_targets, can_transition, LoanRequestStatus};

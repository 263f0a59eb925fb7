//! Loan request route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn loan_request_routes() -> Router<AppState> {
    Router::new()
        .route("/api/loan-requests", post(create_loan_request))
        .route("/api/loan-requests", get(list_loan_requests))
        .route("/api/loan-requests/simulate", post(simulate_loan_request))
        .route("/api/loan-requests/:id", get(get_loan_request))
        .route("/api/loan-requests/:id/cancel", post(cancel_loan_request))
}

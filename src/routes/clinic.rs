//! Clinic route definitions

use axum::{routing::post, Router};

use crate::handlers::clinic_decision;
use crate::state::AppState;

pub fn clinic_routes() -> Router<AppState> {
    Router::new().route(
        "/api/clinic/loan-requests/:id/decision",
        post(clinic_decision),
    )
}

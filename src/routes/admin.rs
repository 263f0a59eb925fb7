//! Admin route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{admin_action, list_webhook_events, sync_loan_request};
use crate::state::AppState;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/loan-requests/:id/action", post(admin_action))
        .route("/api/admin/loan-requests/:id/sync", post(sync_loan_request))
        .route("/api/admin/webhook-events", get(list_webhook_events))
}

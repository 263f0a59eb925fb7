//! Clinic decision handlers

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::financing::{ClinicAction, ClinicDecisionRequest, LoanRequest, LoanRequestStatus};
use crate::middleware::ClinicActor;
use crate::models::ApiResponse;
use crate::state::AppState;

/// Clinic approves or rejects a pending request it owns
pub async fn clinic_decision(
    State(app_state): State<AppState>,
    ClinicActor(actor): ClinicActor,
    Path(id): Path<Uuid>,
    Json(decision): Json<ClinicDecisionRequest>,
) -> ApiResult<Json<ApiResponse<LoanRequest>>> {
    let request = app_state.financing.get_request(id).await?;
    if request.clinic_id != actor.id {
        return Err(ApiError::Forbidden(
            "Request belongs to a different clinic".to_string(),
        ));
    }

    let target = match decision.action {
        ClinicAction::Approve => LoanRequestStatus::ClinicApproved,
        ClinicAction::Reject => LoanRequestStatus::ClinicRejected,
    };

    let updated = app_state
        .financing
        .transition(id, actor, target, decision.notes)
        .await?;

    Ok(Json(ApiResponse::ok(updated)))
}

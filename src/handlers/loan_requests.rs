//! Patient-facing loan request handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::financing::{
    CreateLoanRequest, ListLoanRequestsQuery, LoanRequest, LoanRequestStatus, SimulateRequest,
    SimulateResponse,
};
use crate::middleware::PatientActor;
use crate::models::{Actor, ActorRole, ApiResponse};
use crate::state::AppState;

/// Create a financing request (patient intake)
pub async fn create_loan_request(
    State(app_state): State<AppState>,
    PatientActor(actor): PatientActor,
    Json(request): Json<CreateLoanRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<LoanRequest>>)> {
    let created = app_state
        .financing
        .create_request(actor.id, request)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

/// Preview installment terms without persisting anything
pub async fn simulate_loan_request(
    State(app_state): State<AppState>,
    _actor: Actor,
    Json(request): Json<SimulateRequest>,
) -> ApiResult<Json<ApiResponse<SimulateResponse>>> {
    let terms = app_state
        .financing
        .simulate(request.amount, request.installments)?;

    Ok(Json(ApiResponse::ok(terms)))
}

/// List loan requests, scoped to what the actor may see
pub async fn list_loan_requests(
    State(app_state): State<AppState>,
    actor: Actor,
    Query(mut query): Query<ListLoanRequestsQuery>,
) -> ApiResult<Json<ApiResponse<Vec<LoanRequest>>>> {
    match actor.role {
        ActorRole::Patient => query.patient_id = Some(actor.id),
        ActorRole::Clinic => query.clinic_id = Some(actor.id),
        _ => {}
    }

    let requests = app_state.financing.list_requests(query).await?;

    Ok(Json(ApiResponse::ok(requests)))
}

/// Fetch a single loan request
pub async fn get_loan_request(
    State(app_state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<LoanRequest>>> {
    let request = app_state.financing.get_request(id).await?;
    authorize_view(&actor, &request)?;

    Ok(Json(ApiResponse::ok(request)))
}

/// Cancel a request that has not been submitted or decided yet
pub async fn cancel_loan_request(
    State(app_state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<LoanRequest>>> {
    if actor.role == ActorRole::Patient {
        let request = app_state.financing.get_request(id).await?;
        if request.patient_id != actor.id {
            return Err(ApiError::Forbidden(
                "Only the requesting patient may cancel".to_string(),
            ));
        }
    }

    let cancelled = app_state
        .financing
        .transition(id, actor, LoanRequestStatus::Cancelled, None)
        .await?;

    Ok(Json(ApiResponse::ok(cancelled)))
}

fn authorize_view(actor: &Actor, request: &LoanRequest) -> Result<(), ApiError> {
    let allowed = match actor.role {
        ActorRole::Admin => true,
        ActorRole::Patient => request.patient_id == actor.id,
        ActorRole::Clinic => request.clinic_id == actor.id,
        ActorRole::Gateway => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Not a party to this loan request".to_string(),
        ))
    }
}

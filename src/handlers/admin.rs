//! Admin handlers: gateway submission, manual decisions, status sync,
//! webhook audit log

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::financing::{AdminAction, AdminActionRequest, LoanRequest, LoanRequestStatus};
use crate::middleware::AdminActor;
use crate::models::ApiResponse;
use crate::state::AppState;
use crate::webhooks::{ListWebhookEventsQuery, WebhookEvent};

/// Admin action on a request: forward to the provider, or record a manual
/// decision on a submitted one
pub async fn admin_action(
    State(app_state): State<AppState>,
    AdminActor(actor): AdminActor,
    Path(id): Path<Uuid>,
    Json(action): Json<AdminActionRequest>,
) -> ApiResult<Json<ApiResponse<LoanRequest>>> {
    let updated = match action.action {
        AdminAction::Process => {
            app_state
                .financing
                .submit_to_gateway(id, actor, action.notes)
                .await?
        }
        AdminAction::Approve => {
            app_state
                .financing
                .transition(id, actor, LoanRequestStatus::Approved, action.notes)
                .await?
        }
        AdminAction::Reject => {
            app_state
                .financing
                .transition(id, actor, LoanRequestStatus::Rejected, action.notes)
                .await?
        }
    };

    Ok(Json(ApiResponse::ok(updated)))
}

/// Poll the provider for a submitted request and apply the resulting hint
pub async fn sync_loan_request(
    State(app_state): State<AppState>,
    AdminActor(_actor): AdminActor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<LoanRequest>>> {
    let request = app_state.financing.get_request(id).await?;

    let external_id = request.gateway_request_id.as_deref().ok_or_else(|| {
        ApiError::BadRequest("Loan request has not been submitted to the provider".to_string())
    })?;

    let (hint, raw) = app_state.gateway.poll_status(external_id).await?;

    app_state
        .financing
        .apply_status_hint(request.id, hint, Some(raw))
        .await?;

    let refreshed = app_state.financing.get_request(id).await?;
    Ok(Json(ApiResponse::ok(refreshed)))
}

/// Webhook audit-log listing for operational follow-up
pub async fn list_webhook_events(
    State(app_state): State<AppState>,
    AdminActor(_actor): AdminActor,
    Query(query): Query<ListWebhookEventsQuery>,
) -> ApiResult<Json<ApiResponse<Vec<WebhookEvent>>>> {
    let events = app_state.webhooks.list_events(query).await?;

    Ok(Json(ApiResponse::ok(events)))
}

//! Provider webhook receiver
//!
//! Takes the raw body so the HMAC is computed over exactly the bytes the
//! provider signed; JSON parsing happens inside the pipeline, after
//! verification.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};

use crate::error::ApiResult;
use crate::models::ApiResponse;
use crate::state::AppState;
use crate::webhooks::WebhookReceipt;

const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Inbound callback endpoint for the financing provider
pub async fn receive_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ApiResponse<WebhookReceipt>>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    let receipt = app_state.webhooks.ingest(signature, &body).await?;

    // Success even for failed handlers: the event is durably logged and the
    // provider must not retry it into a duplicate.
    Ok(Json(ApiResponse::ok(receipt)))
}

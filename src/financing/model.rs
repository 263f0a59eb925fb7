//! Loan request models and data structures

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use super::transitions::LoanRequestStatus;

/// Loan request aggregate root.
///
/// Terms are computed once at creation and never recomputed; `status` is the
/// only field that can change after the gateway linkage is recorded, and only
/// through the transition engine.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LoanRequest {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub clinic_id: Uuid,
    pub amount: Decimal,
    pub installments: i32,
    pub monthly_rate: Decimal,
    pub monthly_payment: Decimal,
    pub total_amount: Decimal,
    pub purpose: String,
    pub status: LoanRequestStatus,
    pub gateway_request_id: Option<String>,
    pub gateway_status: Option<String>,
    /// Raw provider response, retained verbatim for audit
    pub gateway_response: Option<serde_json::Value>,
    pub clinic_notes: Option<String>,
    pub admin_notes: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request DTO for patient intake
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLoanRequest {
    pub clinic_id: Uuid,
    pub amount: Decimal,
    pub installments: u32,
    #[validate(length(min = 10, max = 500, message = "purpose must be 10-500 characters"))]
    pub purpose: String,
}

/// Request DTO for the amortization preview endpoint
#[derive(Debug, Deserialize)]
pub struct SimulateRequest {
    pub amount: Decimal,
    pub installments: u32,
}

/// Computed terms returned by the preview endpoint
#[derive(Debug, Serialize)]
pub struct SimulateResponse {
    pub amount: Decimal,
    pub installments: u32,
    pub monthly_rate: Decimal,
    pub monthly_payment: Decimal,
    pub total_amount: Decimal,
}

/// Clinic decision on a pending request
#[derive(Debug, Deserialize)]
pub struct ClinicDecisionRequest {
    pub action: ClinicAction,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClinicAction {
    Approve,
    Reject,
}

/// Admin action on a clinic-approved or in-processing request
#[derive(Debug, Deserialize)]
pub struct AdminActionRequest {
    pub action: AdminAction,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AdminAction {
    /// Forward to the financing provider
    Process,
    Approve,
    Reject,
}

/// Query parameters for listing loan requests
#[derive(Debug, Deserialize, Default)]
pub struct ListLoanRequestsQuery {
    pub status: Option<LoanRequestStatus>,
    pub patient_id: Option<Uuid>,
    pub clinic_id: Option<Uuid>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

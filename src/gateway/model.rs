//! Provider wire types and status vocabulary

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Connection settings for the provider API
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Per-round-trip timeout in seconds
    pub timeout_seconds: u64,
    /// Cached tokens are refreshed this many seconds before actual expiry
    pub token_expiry_skew_seconds: i64,
}

/// Response of the client-credential exchange
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
}

/// Payload submitted to `POST /loan-requests`
#[derive(Debug, Serialize)]
pub struct SubmitLoanPayload {
    /// Our loan request id, echoed back by the provider as the correlation key
    pub external_reference: Uuid,
    pub patient_id: Uuid,
    pub clinic_id: Uuid,
    pub amount: Decimal,
    pub installments: i32,
    pub monthly_payment: Decimal,
    pub total_amount: Decimal,
    pub purpose: String,
}

/// Parsed fields of a successful submission, plus the raw body for audit
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub external_id: String,
    pub status: String,
    pub raw: serde_json::Value,
}

/// Provider loan-request resource as returned by `GET /loan-requests/{id}`
#[derive(Debug, Deserialize)]
pub struct ProviderLoanStatus {
    pub id: String,
    pub status: String,
}

/// Internal hint derived from the provider's status vocabulary.
///
/// Polling and webhooks share this mapping; callers decide whether a hint
/// becomes a transition (terminal hints) or metadata (everything else).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusHint {
    Approved,
    Rejected,
    UnderAnalysis,
    PendingDocuments,
    Unknown(String),
}

impl StatusHint {
    /// Map a provider status string to an internal hint
    pub fn from_provider(status: &str) -> Self {
        match status {
            "approved" => StatusHint::Approved,
            "rejected" => StatusHint::Rejected,
            "under_analysis" => StatusHint::UnderAnalysis,
            "pending_documents" => StatusHint::PendingDocuments,
            other => StatusHint::Unknown(other.to_string()),
        }
    }

    /// Whether this hint names a final provider decision
    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusHint::Approved | StatusHint::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_mapping() {
        assert_eq!(StatusHint::from_provider("approved"), StatusHint::Approved);
        assert_eq!(StatusHint::from_provider("rejected"), StatusHint::Rejected);
        assert_eq!(
            StatusHint::from_provider("under_analysis"),
            StatusHint::UnderAnalysis
        );
        assert_eq!(
            StatusHint::from_provider("pending_documents"),
            StatusHint::PendingDocuments
        );
        assert_eq!(
            StatusHint::from_provider("queued"),
            StatusHint::Unknown("queued".to_string())
        );
    }

    #[test]
    fn test_terminal_hints() {
        assert!(StatusHint::Approved.is_terminal());
        assert!(StatusHint::Rejected.is_terminal());
        assert!(!StatusHint::UnderAnalysis.is_terminal());
        assert!(!StatusHint::PendingDocuments.is_terminal());
        assert!(!StatusHint::Unknown("queued".to_string()).is_terminal());
    }
}

//! Webhook audit records and wire shapes

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// Processing state of an inbound callback
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "webhook_event_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WebhookEventStatus {
    Received,
    Processed,
    Failed,
}

/// Audit row for one inbound callback, written before any side effect
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub correlation_id: Option<String>,
    pub payload: serde_json::Value,
    pub status: WebhookEventStatus,
    pub error_detail: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Parsed body of a provider callback
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    pub event_type: String,
    pub data: WebhookData,
}

/// Event data common to all handled kinds; event-specific fields stay in the
/// raw payload, which is what the audit log retains.
#[derive(Debug, Deserialize)]
pub struct WebhookData {
    /// Provider id of the submitted loan request, the correlation key
    pub external_id: String,
    pub status: Option<String>,
    pub reason: Option<String>,
}

/// Receipt returned to the provider once the event is durably logged
#[derive(Debug, Serialize)]
pub struct WebhookReceipt {
    pub event_id: Uuid,
    pub status: WebhookEventStatus,
    pub duplicate: bool,
}

/// Query parameters for the audit-log listing
#[derive(Debug, Deserialize, Default)]
pub struct ListWebhookEventsQuery {
    pub status: Option<WebhookEventStatus>,
    pub event_type: Option<String>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_parses_event_specific_fields_loosely() {
        let body = r#"{
            "event_type": "payment.received",
            "data": {
                "external_id": "prov-123",
                "installment_number": 3,
                "amount": "471.53"
            }
        }"#;

        let envelope: WebhookEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.event_type, "payment.received");
        assert_eq!(envelope.data.external_id, "prov-123");
        assert!(envelope.data.status.is_none());
    }

    #[test]
    fn test_envelope_requires_external_id() {
        let body = r#"{"event_type": "loan_request.approved", "data": {}}"#;
        assert!(serde_json::from_str::<WebhookEnvelope>(body).is_err());
    }
}

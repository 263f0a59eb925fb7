//! Webhook processing pipeline
//!
//! Step order is load-bearing: verify, log receipt, idempotency check,
//! dispatch, finalize. The receipt row exists before any business side
//! effect, so every verified callback is recoverable from the log even if the
//! process dies mid-handler.

use std::sync::Arc;

use chrono::Utc;
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use crate::financing::{FinancingError, FinancingService, HintOutcome, LoanRequest};
use crate::gateway::StatusHint;
use crate::models::PaginationParams;
use crate::notifications::{NewNotification, Notifier};

use super::model::{
    ListWebhookEventsQuery, WebhookEnvelope, WebhookEvent, WebhookEventStatus, WebhookReceipt,
};
use super::signature::verify_signature;
use super::WebhookError;

/// Source tag recorded on every audit row
const SOURCE: &str = "financing_gateway";

/// Pipeline for inbound financing-provider callbacks
pub struct WebhookPipeline {
    db_pool: PgPool,
    financing: Arc<FinancingService>,
    notifier: Notifier,
    secret: String,
}

impl WebhookPipeline {
    pub fn new(
        db_pool: PgPool,
        financing: Arc<FinancingService>,
        notifier: Notifier,
        secret: String,
    ) -> Self {
        Self {
            db_pool,
            financing,
            notifier,
            secret,
        }
    }

    /// Ingest one callback delivery.
    ///
    /// Returns `Ok` once the event is durably logged, regardless of handler
    /// outcome; the provider must not see retriable failures for logged
    /// events. Signature and malformed-payload failures return `Err` and map
    /// to 401/400 at the boundary.
    pub async fn ingest(
        &self,
        signature_header: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookReceipt, WebhookError> {
        // 1. Verify before anything touches the database. Nothing about a
        // forged request is worth recording as a business event.
        verify_signature(&self.secret, body, signature_header).map_err(|e| {
            tracing::warn!(error = %e, "Rejected webhook delivery");
            e
        })?;

        // 2. Parse, logging undecodable bodies as permanently failed.
        let envelope: WebhookEnvelope = match serde_json::from_slice(body) {
            Ok(envelope) => envelope,
            Err(parse_err) => {
                let payload = serde_json::from_slice::<serde_json::Value>(body).unwrap_or_else(
                    |_| serde_json::json!({ "raw": String::from_utf8_lossy(body) }),
                );
                let event = self.log_receipt("malformed", None, &payload).await?;
                self.finalize(event.id, WebhookEventStatus::Failed, Some(&parse_err.to_string()))
                    .await?;
                return Err(WebhookError::MalformedPayload(parse_err.to_string()));
            }
        };

        let payload: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

        // 3. Durable receipt before any side effect.
        let event = self
            .log_receipt(
                &envelope.event_type,
                Some(&envelope.data.external_id),
                &payload,
            )
            .await?;

        // 4. Idempotency: a delivery already processed for this correlation
        // and event type is acknowledged without reprocessing.
        if self
            .already_processed(&envelope.data.external_id, &envelope.event_type, event.id)
            .await?
        {
            tracing::info!(
                event_id = %event.id,
                event_type = %envelope.event_type,
                correlation_id = %envelope.data.external_id,
                "Duplicate webhook delivery short-circuited"
            );
            self.finalize(event.id, WebhookEventStatus::Processed, Some("duplicate delivery"))
                .await?;
            return Ok(WebhookReceipt {
                event_id: event.id,
                status: WebhookEventStatus::Processed,
                duplicate: true,
            });
        }

        // 5. Dispatch. Handler failures become a failed audit row, never an
        // error to the provider.
        let outcome = self.dispatch(&envelope, &payload).await;

        // 6. Finalize the audit row exactly once.
        let receipt = match outcome {
            Ok(()) => {
                self.finalize(event.id, WebhookEventStatus::Processed, None)
                    .await?;
                WebhookReceipt {
                    event_id: event.id,
                    status: WebhookEventStatus::Processed,
                    duplicate: false,
                }
            }
            Err(detail) => {
                tracing::warn!(
                    event_id = %event.id,
                    event_type = %envelope.event_type,
                    correlation_id = %envelope.data.external_id,
                    error = %detail,
                    "Webhook handler failed"
                );
                self.finalize(event.id, WebhookEventStatus::Failed, Some(&detail))
                    .await?;
                WebhookReceipt {
                    event_id: event.id,
                    status: WebhookEventStatus::Failed,
                    duplicate: false,
                }
            }
        };

        Ok(receipt)
    }

    /// Audit-log listing for operational follow-up
    pub async fn list_events(
        &self,
        query: ListWebhookEventsQuery,
    ) -> Result<Vec<WebhookEvent>, WebhookError> {
        let (page, limit) = PaginationParams {
            page: query.page,
            limit: query.limit,
        }
        .resolve();

        let mut builder = QueryBuilder::new("SELECT * FROM webhook_events WHERE 1=1");

        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(event_type) = query.event_type {
            builder.push(" AND event_type = ").push_bind(event_type);
        }

        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind((page - 1) * limit);

        let rows = builder
            .build_query_as::<WebhookEvent>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(rows)
    }

    async fn log_receipt(
        &self,
        event_type: &str,
        correlation_id: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<WebhookEvent, WebhookError> {
        let event = sqlx::query_as::<_, WebhookEvent>(
            r#"
            INSERT INTO webhook_events (id, source, event_type, correlation_id, payload, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(SOURCE)
        .bind(event_type)
        .bind(correlation_id)
        .bind(payload)
        .bind(WebhookEventStatus::Received)
        .bind(Utc::now())
        .fetch_one(&self.db_pool)
        .await?;

        Ok(event)
    }

    async fn already_processed(
        &self,
        correlation_id: &str,
        event_type: &str,
        current_event_id: Uuid,
    ) -> Result<bool, WebhookError> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM webhook_events
                WHERE correlation_id = $1 AND event_type = $2
                  AND status = 'processed' AND id != $3
            )
            "#,
        )
        .bind(correlation_id)
        .bind(event_type)
        .bind(current_event_id)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(exists)
    }

    /// Terminal rows are immutable: the status guard makes finalization a
    /// one-shot update.
    async fn finalize(
        &self,
        event_id: Uuid,
        status: WebhookEventStatus,
        error_detail: Option<&str>,
    ) -> Result<(), WebhookError> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = $2, error_detail = $3, processed_at = $4
            WHERE id = $1 AND status = 'received'
            "#,
        )
        .bind(event_id)
        .bind(status)
        .bind(error_detail)
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn dispatch(
        &self,
        envelope: &WebhookEnvelope,
        payload: &serde_json::Value,
    ) -> Result<(), String> {
        match envelope.event_type.as_str() {
            "loan_request.approved" => {
                self.apply_hint(envelope, StatusHint::Approved, Some(payload.clone()))
                    .await
            }
            "loan_request.rejected" => {
                self.apply_hint(envelope, StatusHint::Rejected, Some(payload.clone()))
                    .await
            }
            "loan_request.under_analysis" => {
                self.apply_hint(envelope, StatusHint::UnderAnalysis, None).await
            }
            "loan_request.pending_documents" => {
                let request = self.resolve(envelope).await?;
                let outcome = self
                    .financing
                    .apply_status_hint(request.id, StatusHint::PendingDocuments, None)
                    .await
                    .map_err(|e| e.to_string())?;

                if matches!(outcome, HintOutcome::MetadataUpdated) {
                    self.notifier
                        .enqueue(NewNotification {
                            recipient_id: request.patient_id,
                            title: "Documents required".to_string(),
                            message:
                                "The financing provider needs additional documents to continue."
                                    .to_string(),
                            category: "loan_documents",
                            loan_request_id: Some(request.id),
                        })
                        .await;
                }
                Ok(())
            }
            "payment.received" => {
                let request = self.resolve(envelope).await?;
                self.notifier
                    .enqueue(NewNotification {
                        recipient_id: request.patient_id,
                        title: "Payment received".to_string(),
                        message: "An installment payment was received by the financing provider."
                            .to_string(),
                        category: "payment",
                        loan_request_id: Some(request.id),
                    })
                    .await;
                Ok(())
            }
            "payment.overdue" => {
                let request = self.resolve(envelope).await?;
                self.notifier
                    .enqueue(NewNotification {
                        recipient_id: request.patient_id,
                        title: "Payment overdue".to_string(),
                        message: "An installment payment is overdue with the financing provider."
                            .to_string(),
                        category: "payment",
                        loan_request_id: Some(request.id),
                    })
                    .await;
                Ok(())
            }
            other => {
                // Forward-compatible no-op: future event kinds are logged and
                // acknowledged.
                tracing::info!(event_type = %other, "Unhandled webhook event type");
                Ok(())
            }
        }
    }

    async fn apply_hint(
        &self,
        envelope: &WebhookEnvelope,
        hint: StatusHint,
        raw: Option<serde_json::Value>,
    ) -> Result<(), String> {
        let request = self.resolve(envelope).await?;

        match self.financing.apply_status_hint(request.id, hint, raw).await {
            Ok(_) => Ok(()),
            Err(FinancingError::InvalidTransition { current, requested }) => Err(format!(
                "transition to {} not permitted from {}",
                requested, current
            )),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn resolve(&self, envelope: &WebhookEnvelope) -> Result<LoanRequest, String> {
        self.financing
            .find_by_gateway_id(&envelope.data.external_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| {
                format!(
                    "no loan request for correlation key {}",
                    envelope.data.external_id
                )
            })
    }
}

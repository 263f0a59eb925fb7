//! Financing service - business logic for the loan request lifecycle
//!
//! Every mutation of a loan request happens here, inside a per-row
//! transaction: the transition-table check, the status write, terminal
//! timestamps, notes, and the notification row commit or roll back together.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::gateway::{GatewayClient, GatewayError, StatusHint, SubmitLoanPayload};
use crate::models::{Actor, ActorRole, Clinic, PaginationParams};
use crate::notifications::{NewNotification, Notifier};

use super::amortization::{payment_terms, InvalidTerms};
use super::model::{
    CreateLoanRequest, ListLoanRequestsQuery, LoanRequest, SimulateResponse,
};
use super::transitions::{can_transition, denial_reason, LoanRequestStatus};

/// Errors surfaced by financing operations
#[derive(Debug, Error)]
pub enum FinancingError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Terms(#[from] InvalidTerms),

    #[error("Clinic {0} not found or inactive")]
    ClinicNotFound(Uuid),

    #[error("Loan request {0} not found")]
    NotFound(Uuid),

    #[error("{}", denial_reason(*.current, *.requested))]
    InvalidTransition {
        current: LoanRequestStatus,
        requested: LoanRequestStatus,
    },

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Configured bounds for new financing requests
#[derive(Debug, Clone)]
pub struct LoanBounds {
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub min_installments: u32,
    pub max_installments: u32,
    pub default_monthly_rate: Decimal,
}

/// Result of applying a provider status hint
#[derive(Debug)]
pub enum HintOutcome {
    /// The hint drove a transition to a terminal state
    Transitioned(LoanRequest),
    /// Only the gateway-status metadata changed
    MetadataUpdated,
    /// Nothing to apply (unknown status, or the request left processing)
    Ignored,
}

/// Service owning the loan request lifecycle
pub struct FinancingService {
    db_pool: PgPool,
    bounds: LoanBounds,
    gateway: Arc<GatewayClient>,
}

impl FinancingService {
    pub fn new(db_pool: PgPool, bounds: LoanBounds, gateway: Arc<GatewayClient>) -> Self {
        Self {
            db_pool,
            bounds,
            gateway,
        }
    }

    /// Compute installment terms without persisting anything
    pub fn simulate(
        &self,
        amount: Decimal,
        installments: u32,
    ) -> Result<SimulateResponse, FinancingError> {
        self.check_bounds(amount, installments)?;

        let terms = payment_terms(amount, installments, self.bounds.default_monthly_rate)?;

        Ok(SimulateResponse {
            amount,
            installments,
            monthly_rate: self.bounds.default_monthly_rate,
            monthly_payment: terms.monthly_payment,
            total_amount: terms.total_amount,
        })
    }

    /// Patient intake: validate, compute terms once, persist as `pending`
    pub async fn create_request(
        &self,
        patient_id: Uuid,
        request: CreateLoanRequest,
    ) -> Result<LoanRequest, FinancingError> {
        request
            .validate()
            .map_err(|e| FinancingError::Validation(e.to_string()))?;
        self.check_bounds(request.amount, request.installments)?;

        let clinic = sqlx::query_as::<_, Clinic>(
            "SELECT * FROM clinics WHERE id = $1 AND active = TRUE",
        )
        .bind(request.clinic_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or(FinancingError::ClinicNotFound(request.clinic_id))?;

        let rate = self.bounds.default_monthly_rate;
        let terms = payment_terms(request.amount, request.installments, rate)?;

        let loan_request = sqlx::query_as::<_, LoanRequest>(
            r#"
            INSERT INTO loan_requests (
                id, patient_id, clinic_id, amount, installments, monthly_rate,
                monthly_payment, total_amount, purpose, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(patient_id)
        .bind(clinic.id)
        .bind(request.amount)
        .bind(request.installments as i32)
        .bind(rate)
        .bind(terms.monthly_payment)
        .bind(terms.total_amount)
        .bind(&request.purpose)
        .bind(LoanRequestStatus::Pending)
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(
            loan_request_id = %loan_request.id,
            clinic_id = %clinic.id,
            amount = %loan_request.amount,
            installments = loan_request.installments,
            "Loan request created"
        );

        Ok(loan_request)
    }

    /// Fetch one loan request
    pub async fn get_request(&self, id: Uuid) -> Result<LoanRequest, FinancingError> {
        sqlx::query_as::<_, LoanRequest>("SELECT * FROM loan_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or(FinancingError::NotFound(id))
    }

    /// Resolve a loan request by the provider's correlation key
    pub async fn find_by_gateway_id(
        &self,
        gateway_request_id: &str,
    ) -> Result<Option<LoanRequest>, FinancingError> {
        let found = sqlx::query_as::<_, LoanRequest>(
            "SELECT * FROM loan_requests WHERE gateway_request_id = $1",
        )
        .bind(gateway_request_id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(found)
    }

    /// List loan requests with filters and pagination
    pub async fn list_requests(
        &self,
        query: ListLoanRequestsQuery,
    ) -> Result<Vec<LoanRequest>, FinancingError> {
        let (page, limit) = PaginationParams {
            page: query.page,
            limit: query.limit,
        }
        .resolve();

        let mut builder = QueryBuilder::new("SELECT * FROM loan_requests WHERE 1=1");

        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(patient_id) = query.patient_id {
            builder.push(" AND patient_id = ").push_bind(patient_id);
        }
        if let Some(clinic_id) = query.clinic_id {
            builder.push(" AND clinic_id = ").push_bind(clinic_id);
        }

        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind((page - 1) * limit);

        let rows = builder
            .build_query_as::<LoanRequest>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(rows)
    }

    /// Apply one state transition atomically.
    ///
    /// The row is locked, the transition table consulted, and the status,
    /// terminal timestamp, note, and notification written in one transaction.
    /// Concurrent attempts on the same request serialize on the row lock; the
    /// loser re-reads a state that no longer permits its move and fails.
    pub async fn transition(
        &self,
        id: Uuid,
        actor: Actor,
        target: LoanRequestStatus,
        notes: Option<String>,
    ) -> Result<LoanRequest, FinancingError> {
        self.transition_with_gateway(id, actor, target, notes, None)
            .await
    }

    /// Transition driven by a provider decision, recording the gateway
    /// metadata in the same transaction.
    pub async fn apply_gateway_decision(
        &self,
        id: Uuid,
        target: LoanRequestStatus,
        gateway_status: String,
        raw: Option<serde_json::Value>,
    ) -> Result<LoanRequest, FinancingError> {
        self.transition_with_gateway(
            id,
            Actor::gateway(),
            target,
            None,
            Some((gateway_status, raw)),
        )
        .await
    }

    async fn transition_with_gateway(
        &self,
        id: Uuid,
        actor: Actor,
        target: LoanRequestStatus,
        notes: Option<String>,
        gateway: Option<(String, Option<serde_json::Value>)>,
    ) -> Result<LoanRequest, FinancingError> {
        let mut tx = self.db_pool.begin().await?;

        let current = sqlx::query_as::<_, LoanRequest>(
            "SELECT * FROM loan_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(FinancingError::NotFound(id))?;

        if !can_transition(actor.role, current.status, target) {
            return Err(FinancingError::InvalidTransition {
                current: current.status,
                requested: target,
            });
        }

        let now = Utc::now();
        let approved_at = match target {
            LoanRequestStatus::Approved => Some(now),
            _ => current.approved_at,
        };
        // Every terminal state stamps exactly one decision timestamp;
        // cancellation closes the request on the rejected side since it will
        // never be financed.
        let rejected_at = match target {
            LoanRequestStatus::Rejected
            | LoanRequestStatus::ClinicRejected
            | LoanRequestStatus::Cancelled => Some(now),
            _ => current.rejected_at,
        };

        let clinic_notes = match (actor.role, &notes) {
            (ActorRole::Clinic, Some(note)) => Some(append_note(&current.clinic_notes, note)),
            _ => current.clinic_notes.clone(),
        };
        let admin_notes = match (actor.role, &notes) {
            (ActorRole::Admin, Some(note)) => Some(append_note(&current.admin_notes, note)),
            _ => current.admin_notes.clone(),
        };

        let (gateway_status, gateway_response) = match gateway {
            Some((status, raw)) => (
                Some(status),
                raw.or_else(|| current.gateway_response.clone()),
            ),
            None => (
                current.gateway_status.clone(),
                current.gateway_response.clone(),
            ),
        };

        let updated = sqlx::query_as::<_, LoanRequest>(
            r#"
            UPDATE loan_requests
            SET status = $2, approved_at = $3, rejected_at = $4,
                clinic_notes = $5, admin_notes = $6,
                gateway_status = $7, gateway_response = $8, updated_at = $9
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(target)
        .bind(approved_at)
        .bind(rejected_at)
        .bind(clinic_notes)
        .bind(admin_notes)
        .bind(gateway_status)
        .bind(gateway_response)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        self.enqueue_transition_notifications(&mut tx, &updated, actor.role)
            .await?;

        tx.commit().await?;

        tracing::info!(
            loan_request_id = %id,
            from = %current.status,
            to = %target,
            actor = %actor.role,
            "Loan request transitioned"
        );

        Ok(updated)
    }

    /// Forward a clinic-approved request to the financing provider.
    ///
    /// The network call runs without holding any row lock; the result is
    /// applied with a conditional update so a racing transition turns into a
    /// conflict instead of a silent overwrite.
    pub async fn submit_to_gateway(
        &self,
        id: Uuid,
        admin: Actor,
        notes: Option<String>,
    ) -> Result<LoanRequest, FinancingError> {
        let request = self.get_request(id).await?;

        if request.status != LoanRequestStatus::ClinicApproved {
            return Err(FinancingError::InvalidTransition {
                current: request.status,
                requested: LoanRequestStatus::AdminProcessing,
            });
        }

        let payload = SubmitLoanPayload {
            external_reference: request.id,
            patient_id: request.patient_id,
            clinic_id: request.clinic_id,
            amount: request.amount,
            installments: request.installments,
            monthly_payment: request.monthly_payment,
            total_amount: request.total_amount,
            purpose: request.purpose.clone(),
        };

        let outcome = self.gateway.submit(&payload).await?;

        let mut tx = self.db_pool.begin().await?;

        let admin_notes = match &notes {
            Some(note) => Some(append_note(&request.admin_notes, note)),
            None => request.admin_notes.clone(),
        };

        // Optimistic: only applies if the request is still clinic_approved.
        let updated = sqlx::query_as::<_, LoanRequest>(
            r#"
            UPDATE loan_requests
            SET status = $2, gateway_request_id = $3, gateway_status = $4,
                gateway_response = $5, admin_notes = $6, updated_at = $7
            WHERE id = $1 AND status = 'clinic_approved'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(LoanRequestStatus::AdminProcessing)
        .bind(&outcome.external_id)
        .bind(&outcome.status)
        .bind(&outcome.raw)
        .bind(admin_notes)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            FinancingError::Conflict(
                "loan request state changed during gateway submission; re-read and retry"
                    .to_string(),
            )
        })?;

        self.enqueue_transition_notifications(&mut tx, &updated, admin.role)
            .await?;

        tx.commit().await?;

        Ok(updated)
    }

    /// Apply a provider status hint obtained from polling or a webhook.
    ///
    /// Terminal hints go through the transition engine as the gateway actor;
    /// everything else only touches the gateway-status metadata, gated on the
    /// request still being in processing so terminal states never regress.
    pub async fn apply_status_hint(
        &self,
        id: Uuid,
        hint: StatusHint,
        raw: Option<serde_json::Value>,
    ) -> Result<HintOutcome, FinancingError> {
        match hint {
            StatusHint::Approved => self
                .apply_gateway_decision(id, LoanRequestStatus::Approved, "approved".to_string(), raw)
                .await
                .map(HintOutcome::Transitioned),
            StatusHint::Rejected => self
                .apply_gateway_decision(id, LoanRequestStatus::Rejected, "rejected".to_string(), raw)
                .await
                .map(HintOutcome::Transitioned),
            StatusHint::UnderAnalysis => self.update_gateway_metadata(id, "under_analysis").await,
            StatusHint::PendingDocuments => {
                self.update_gateway_metadata(id, "pending_documents").await
            }
            StatusHint::Unknown(status) => {
                tracing::warn!(
                    loan_request_id = %id,
                    status = %status,
                    "Ignoring unknown provider status"
                );
                Ok(HintOutcome::Ignored)
            }
        }
    }

    /// Record a processing sub-status without touching `status`
    async fn update_gateway_metadata(
        &self,
        id: Uuid,
        gateway_status: &str,
    ) -> Result<HintOutcome, FinancingError> {
        let result = sqlx::query(
            r#"
            UPDATE loan_requests
            SET gateway_status = $2, updated_at = $3
            WHERE id = $1 AND status = 'admin_processing'
            "#,
        )
        .bind(id)
        .bind(gateway_status)
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            // Already decided or not yet submitted; out-of-order events land
            // here and are deliberately dropped.
            return Ok(HintOutcome::Ignored);
        }

        Ok(HintOutcome::MetadataUpdated)
    }

    fn check_bounds(&self, amount: Decimal, installments: u32) -> Result<(), FinancingError> {
        if amount < self.bounds.min_amount || amount > self.bounds.max_amount {
            return Err(FinancingError::Validation(format!(
                "amount must be between {} and {}",
                self.bounds.min_amount, self.bounds.max_amount
            )));
        }
        if installments < self.bounds.min_installments
            || installments > self.bounds.max_installments
        {
            return Err(FinancingError::Validation(format!(
                "installments must be between {} and {}",
                self.bounds.min_installments, self.bounds.max_installments
            )));
        }
        Ok(())
    }

    /// One notification to the patient per successful transition, plus one to
    /// the clinic for the stages the clinic is a party to.
    async fn enqueue_transition_notifications(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        request: &LoanRequest,
        acted_by: ActorRole,
    ) -> Result<(), sqlx::Error> {
        let (title, message) = status_notification_text(request.status);

        Notifier::enqueue_in_tx(
            tx,
            NewNotification {
                recipient_id: request.patient_id,
                title: title.to_string(),
                message: message.to_string(),
                category: "loan_status",
                loan_request_id: Some(request.id),
            },
        )
        .await?;

        let clinic_facing = matches!(
            request.status,
            LoanRequestStatus::ClinicApproved
                | LoanRequestStatus::ClinicRejected
                | LoanRequestStatus::Cancelled
        ) && acted_by != ActorRole::Clinic;

        if clinic_facing {
            Notifier::enqueue_in_tx(
                tx,
                NewNotification {
                    recipient_id: request.clinic_id,
                    title: title.to_string(),
                    message: message.to_string(),
                    category: "loan_status",
                    loan_request_id: Some(request.id),
                },
            )
            .await?;
        }

        Ok(())
    }
}

fn append_note(existing: &Option<String>, note: &str) -> String {
    match existing {
        Some(prior) => format!("{}\n{}", prior, note),
        None => note.to_string(),
    }
}

fn status_notification_text(status: LoanRequestStatus) -> (&'static str, &'static str) {
    match status {
        LoanRequestStatus::Pending => (
            "Financing request received",
            "Your financing request was received and is awaiting clinic review.",
        ),
        LoanRequestStatus::ClinicApproved => (
            "Clinic approved your request",
            "The clinic pre-approved your financing request; it now awaits processing.",
        ),
        LoanRequestStatus::ClinicRejected => (
            "Clinic declined your request",
            "The clinic declined your financing request.",
        ),
        LoanRequestStatus::AdminProcessing => (
            "Request sent for financing",
            "Your financing request was forwarded to the financing provider.",
        ),
        LoanRequestStatus::Approved => (
            "Financing approved",
            "Your financing request was approved by the financing provider.",
        ),
        LoanRequestStatus::Rejected => (
            "Financing declined",
            "Your financing request was declined by the financing provider.",
        ),
        LoanRequestStatus::Cancelled => (
            "Request cancelled",
            "The financing request was cancelled.",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_note() {
        assert_eq!(append_note(&None, "first"), "first");
        assert_eq!(
            append_note(&Some("first".to_string()), "second"),
            "first\nsecond"
        );
    }

    #[test]
    fn test_every_status_has_notification_text() {
        for status in LoanRequestStatus::all() {
            let (title, message) = status_notification_text(status);
            assert!(!title.is_empty());
            assert!(!message.is_empty());
        }
    }
}

//! Notification outbox
//!
//! The notification emitter is an external collaborator; this service only
//! appends rows to an outbox table it consumes. Status-change notifications
//! are written inside the same transaction as the transition so that exactly
//! one row exists per successful transition.

use serde::Serialize;
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Outbox row consumed by the notification emitter
#[derive(Debug, Serialize, sqlx::FromRow, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub title: String,
    pub message: String,
    pub category: String,
    pub loan_request_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Notification to enqueue
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub title: String,
    pub message: String,
    pub category: &'static str,
    pub loan_request_id: Option<Uuid>,
}

const INSERT_SQL: &str = r#"
    INSERT INTO notifications (id, recipient_id, title, message, category, loan_request_id, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
"#;

/// Writer for the notification outbox
#[derive(Clone)]
pub struct Notifier {
    db_pool: PgPool,
}

impl Notifier {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Enqueue a notification inside an open transaction.
    ///
    /// Used by the transition engine so the notification commits or rolls
    /// back together with the status change.
    pub async fn enqueue_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        notification: NewNotification,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(INSERT_SQL)
            .bind(Uuid::new_v4())
            .bind(notification.recipient_id)
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(notification.category)
            .bind(notification.loan_request_id)
            .bind(Utc::now())
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Enqueue a notification outside any transaction.
    ///
    /// Used for informational events (payment received/overdue) where a lost
    /// notification must not fail the caller; failures are logged only.
    pub async fn enqueue(&self, notification: NewNotification) {
        let result = sqlx::query(INSERT_SQL)
            .bind(Uuid::new_v4())
            .bind(notification.recipient_id)
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(notification.category)
            .bind(notification.loan_request_id)
            .bind(Utc::now())
            .execute(&self.db_pool)
            .await;

        if let Err(e) = result {
            tracing::error!(
                recipient = %notification.recipient_id,
                category = %notification.category,
                error = %e,
                "Failed to enqueue notification"
            );
        }
    }
}

//! Webhook ingestion pipeline
//!
//! Inbound provider callbacks are verified, durably logged, deduplicated, and
//! dispatched to per-event handlers in that strict order. A handler failure
//! marks the audit row `failed` and leaves the loan request untouched.

mod model;
mod pipeline;
pub mod signature;

use thiserror::Error;

pub use model::*;
pub use pipeline::WebhookPipeline;
pub use signature::verify_signature;

/// Errors surfaced to the webhook receiver endpoint.
///
/// Handler failures are not represented here: once the event is durably
/// logged the provider gets a success response and the failure lives in the
/// audit row.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Webhook signature header missing")]
    MissingSignature,

    #[error("Webhook signature mismatch")]
    InvalidSignature,

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

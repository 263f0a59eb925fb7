//! Shared data models for the DentaLink financing backend

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// Standard API response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Successful response carrying `data`
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed response carrying an error message
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Pagination parameters
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

impl PaginationParams {
    /// Resolve page/limit with defaults and clamped bounds
    pub fn resolve(&self) -> (i64, i64) {
        let page = i64::from(self.page.unwrap_or(1).max(1));
        let limit = i64::from(self.limit.unwrap_or(20).clamp(1, 100));
        (page, limit)
    }
}

/// Roles the subsystem distinguishes when consulting the transition table.
///
/// `Gateway` is never accepted from a request header; it is assumed internally
/// by the webhook pipeline and the admin-triggered status sync.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Patient,
    Clinic,
    Admin,
    Gateway,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Patient => "patient",
            ActorRole::Clinic => "clinic",
            ActorRole::Admin => "admin",
            ActorRole::Gateway => "gateway",
        }
    }
}

impl std::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated actor supplied by the upstream identity layer
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    /// Internal actor used when applying provider-reported outcomes
    pub fn gateway() -> Self {
        Self {
            id: Uuid::nil(),
            role: ActorRole::Gateway,
        }
    }
}

/// Clinic directory row, mirrored from the marketplace core.
///
/// Only the `active` flag matters to this service: intake rejects requests
/// against unknown or deactivated clinics.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Clinic {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

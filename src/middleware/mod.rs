//! Middleware for the DentaLink financing API
//!
//! This module provides middleware for request tracing, rate limiting,
//! security headers, and actor-context extraction.

pub mod actor;
mod rate_limiter;
mod security;
mod tracing;

pub use actor::{AdminActor, ClinicActor, PatientActor};
pub use rate_limiter::{rate_limit_layer, RateLimiter};
pub use security::{hsts_header, security_headers};
pub use tracing::request_tracing;

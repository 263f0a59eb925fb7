//! DentaLink Financing Backend Library
//!
//! This library exports the core modules for the DentaLink financing backend:
//! the loan request lifecycle, the financing-gateway client, and the webhook
//! reconciliation pipeline.

pub mod config;
pub mod db;
pub mod error;
pub mod financing;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod routes;
pub mod state;
pub mod webhooks;

pub use config::Config;
pub use state::AppState;

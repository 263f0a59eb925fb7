//! Financing provider gateway
//!
//! Owns the access-token lifecycle and every network round trip against the
//! external financing provider. Nothing here mutates a loan request; the
//! financing service applies outcomes after the call returns.

mod client;
mod model;

pub use client::{GatewayClient, GatewayError};
pub use model::*;

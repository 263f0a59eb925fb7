//! API handlers for the DentaLink financing backend

mod admin;
mod clinic;
mod loan_requests;
mod webhooks;

pub use admin::*;
pub use clinic::*;
pub use loan_requests::*;
pub use webhooks::*;

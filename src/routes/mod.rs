//! Route definitions for the DentaLink financing API

mod admin;
mod clinic;
mod loan_requests;
mod webhooks;

pub use admin::admin_routes;
pub use clinic::clinic_routes;
pub use loan_requests::loan_request_routes;
pub use webhooks::webhook_routes;

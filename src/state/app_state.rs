//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::db::Database;
use crate::financing::FinancingService;
use crate::gateway::GatewayClient;
use crate::webhooks::WebhookPipeline;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub financing: Arc<FinancingService>,
    pub gateway: Arc<GatewayClient>,
    pub webhooks: Arc<WebhookPipeline>,
    pub db: Database,
}

impl AppState {
    pub fn new(
        financing: Arc<FinancingService>,
        gateway: Arc<GatewayClient>,
        webhooks: Arc<WebhookPipeline>,
        db: Database,
    ) -> Self {
        Self {
            financing,
            gateway,
            webhooks,
            db,
        }
    }
}

impl FromRef<AppState> for Arc<FinancingService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.financing.clone()
    }
}

impl FromRef<AppState> for Arc<GatewayClient> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.gateway.clone()
    }
}

impl FromRef<AppState> for Arc<WebhookPipeline> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.webhooks.clone()
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.db.clone()
    }
}

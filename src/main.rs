//! DentaLink Financing Backend Server
//!
//! Backend service for the clinic-booking marketplace's consumer-financing
//! feature: loan request lifecycle, financing-gateway integration, and
//! webhook reconciliation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::{routing::get, Router};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use dentalink_server::config::Config;
use dentalink_server::db::{self, Database};
use dentalink_server::financing::{FinancingService, LoanBounds};
use dentalink_server::gateway::{GatewayClient, GatewaySettings};
use dentalink_server::middleware::{self, RateLimiter};
use dentalink_server::notifications::Notifier;
use dentalink_server::routes;
use dentalink_server::state::AppState;
use dentalink_server::webhooks::WebhookPipeline;

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .init();

    tracing::info!(environment = %config.environment.as_str(), "Starting dentalink-server");

    // Database pool and migrations
    let db_pool = match db::create_pool(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = db::run_migrations(&db_pool).await {
        tracing::error!("Failed to run migrations: {}", e);
        std::process::exit(1);
    }

    // Gateway client with its process-wide token cache
    let gateway = Arc::new(GatewayClient::new(GatewaySettings {
        base_url: config.gateway_base_url.clone(),
        client_id: config.gateway_client_id.clone(),
        client_secret: config.gateway_client_secret.clone(),
        timeout_seconds: config.gateway_timeout_seconds,
        token_expiry_skew_seconds: config.gateway_token_expiry_skew_seconds,
    }));

    // Domain services
    let financing = Arc::new(FinancingService::new(
        db_pool.clone(),
        LoanBounds {
            min_amount: config.min_loan_amount,
            max_amount: config.max_loan_amount,
            min_installments: config.min_installments,
            max_installments: config.max_installments,
            default_monthly_rate: config.default_monthly_rate,
        },
        gateway.clone(),
    ));

    let notifier = Notifier::new(db_pool.clone());

    let webhooks = Arc::new(WebhookPipeline::new(
        db_pool.clone(),
        financing.clone(),
        notifier,
        config.webhook_secret.clone(),
    ));

    let app_state = AppState::new(
        financing,
        gateway,
        webhooks,
        Database::new(db_pool.clone()),
    );

    // Rate limiter (requests per second per client)
    let rate_limiter = RateLimiter::new(config.rate_limit_rps);

    // Assemble the router
    let mut app = Router::new()
        .route("/", get(root))
        .route("/health", get(move || health_check(db_pool.clone())))
        .merge(routes::loan_request_routes())
        .merge(routes::clinic_routes())
        .merge(routes::admin_routes())
        .merge(routes::webhook_routes())
        .with_state(app_state)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(axum::middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            middleware::rate_limit_layer(limiter)(req, next)
        }))
        .layer(configure_cors(&config));

    if config.environment.is_production() {
        app = app.layer(axum::middleware::from_fn(middleware::hsts_header));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Server shutdown complete");
}

async fn root() -> &'static str {
    "DentaLink Financing API Server"
}

/// Health check response
#[derive(serde::Serialize)]
struct HealthResponse {
    status: String,
    database: String,
    version: String,
}

/// Health check endpoint
async fn health_check(pool: sqlx::PgPool) -> axum::Json<HealthResponse> {
    let db_status = match sqlx::query("SELECT 1").execute(&pool).await {
        Ok(_) => "connected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    let status = if db_status == "connected" {
        "healthy"
    } else {
        "unhealthy"
    };

    axum::Json(HealthResponse {
        status: status.to_string(),
        database: db_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn configure_cors(config: &Config) -> CorsLayer {
    let allowed_origins_str = config.cors_allowed_origins.clone().unwrap_or_default();

    if allowed_origins_str.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins_str
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

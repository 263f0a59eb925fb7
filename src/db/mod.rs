//! PostgreSQL access for the financing subsystem
//!
//! One pool serves the whole process. Sizing stays small on purpose: the hot
//! paths are short row-locked transactions on `loan_requests`, and a modest
//! pool keeps lock waits visible instead of hiding them behind queued
//! connections.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::Config;

/// Database errors surfaced during startup and health checks
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database connection failed: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Database health check failed: {0}")]
    Health(#[source] sqlx::Error),
}

/// Build the process-wide connection pool
pub async fn create_pool(config: &Config) -> Result<PgPool, DbError> {
    tracing::info!("Connecting to database at {}", config.database_url_masked());

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect(&config.database_url)
        .await
        .map_err(DbError::Connect)?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Database pool ready"
    );

    Ok(pool)
}

/// Apply pending migrations at startup; already-applied files are skipped.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    tracing::info!("Applying database migrations");

    sqlx::migrate!("./migrations").run(pool).await?;

    tracing::info!("Database migrations up to date");

    Ok(())
}

/// Round-trip connectivity probe backing the health endpoint
pub async fn check_health(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(DbError::Health)?;

    Ok(())
}

/// Pool handle carried in application state
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn is_healthy(&self) -> bool {
        check_health(&self.pool).await.is_ok()
    }
}

impl std::ops::Deref for Database {
    type Target = PgPool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

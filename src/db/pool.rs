use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};

/// Connection handle that may be absent. Without a pool the service runs in
/// database-unavailable mode: reads come back empty and writes fail.
#[derive(Clone, Default)]
pub struct Database {
    pool: Option<PgPool>,
}

impl Database {
    pub fn unavailable() -> Self {
        Self { pool: None }
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }

    /// Pool for reads; `None` means the caller should return its empty default.
    pub fn reader(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    /// Pool for writes.
    pub fn writer(&self) -> AppResult<&PgPool> {
        self.pool.as_ref().ok_or(AppError::Unavailable)
    }

    pub async fn ping(&self) -> bool {
        match &self.pool {
            Some(pool) => sqlx::query_scalar::<_, i32>("SELECT 1")
                .fetch_one(pool)
                .await
                .is_ok(),
            None => false,
        }
    }
}

/// Connect and migrate. Any failure is logged and degrades to unavailable mode.
pub async fn connect(database_url: Option<&str>) -> Database {
    let Some(url) = database_url else {
        tracing::warn!("No database URL configured, running in database-unavailable mode");
        return Database::unavailable();
    };

    let pool = match PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create database pool, running in database-unavailable mode");
            return Database::unavailable();
        }
    };

    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        tracing::error!(error = %e, "Failed to run database migrations, running in database-unavailable mode");
        return Database::unavailable();
    }

    tracing::info!("Database migrations applied");
    Database { pool: Some(pool) }
}

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::config::StorageBackend;
use crate::AppState;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "mindful-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Ready when the configured backend can serve writes.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = match state.config.storage_backend {
        StorageBackend::Memory => "in_memory",
        StorageBackend::Postgres if !state.db.is_available() => "unavailable",
        StorageBackend::Postgres if state.db.ping().await => "ok",
        StorageBackend::Postgres => "failed",
    };

    if matches!(database, "ok" | "in_memory") {
        (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "checks": { "database": database },
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": { "database": database },
            })),
        )
    }
}

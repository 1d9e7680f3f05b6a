use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: bool,
    pub timezone: String,
    pub timestamp: String,
}

/// Liveness plus a cheap round-trip to the store. Degraded storage is 503.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = sqlx::query("SELECT 1")
        .execute(state.store.pool())
        .await
        .map_err(|e| tracing::warn!("Health check database probe failed: {}", e))
        .is_ok();

    let response = HealthResponse {
        status: if database { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database,
        timezone: state.config.scheduler.timezone.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

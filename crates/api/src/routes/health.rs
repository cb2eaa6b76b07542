use axum::{Json, Router, extract::State, routing::get};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::{ApiState, middleware::error_handling::AppError};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct VersionResponse {
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Ready once the store answers a slot index read.
async fn readiness(State(state): State<Arc<ApiState>>) -> Result<Json<HealthResponse>, AppError> {
    state
        .allocator
        .booked_times(Utc::now().date_naive())
        .await?;
    Ok(Json(HealthResponse { status: "ready" }))
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn routes() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness))
        .route("/version", get(version))
}

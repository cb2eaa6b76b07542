use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use openhouse_core::models::application::{
    Application, ApplicationId, CancelApplicationResponse, CreateApplicationRequest,
    UpdateApplicationRequest,
};

use crate::{
    ApiState,
    middleware::error_handling::{AppError, JsonBody, PathParam},
};

#[axum::debug_handler]
pub async fn create_application(
    State(state): State<Arc<ApiState>>,
    JsonBody(payload): JsonBody<CreateApplicationRequest>,
) -> Result<(StatusCode, Json<Application>), AppError> {
    let application = state
        .allocator
        .reserve(
            payload.appointment_date,
            payload.appointment_time,
            payload.payload,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(application)))
}

#[axum::debug_handler]
pub async fn list_applications(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<Application>>, AppError> {
    let applications = state.allocator.list_all().await?;
    Ok(Json(applications))
}

#[axum::debug_handler]
pub async fn get_application(
    State(state): State<Arc<ApiState>>,
    PathParam(id): PathParam<ApplicationId>,
) -> Result<Json<Application>, AppError> {
    let application = state.allocator.get(id).await?;
    Ok(Json(application))
}

#[axum::debug_handler]
pub async fn update_application(
    State(state): State<Arc<ApiState>>,
    PathParam(id): PathParam<ApplicationId>,
    JsonBody(payload): JsonBody<UpdateApplicationRequest>,
) -> Result<Json<Application>, AppError> {
    let application = state.allocator.update(id, payload).await?;
    Ok(Json(application))
}

#[axum::debug_handler]
pub async fn delete_application(
    State(state): State<Arc<ApiState>>,
    PathParam(id): PathParam<ApplicationId>,
) -> Result<Json<CancelApplicationResponse>, AppError> {
    state.allocator.cancel(id).await?;

    let response = CancelApplicationResponse {
        id,
        cancelled_at: Utc::now(),
    };

    Ok(Json(response))
}

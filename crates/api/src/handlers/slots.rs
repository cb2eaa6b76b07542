//! # Slot Handlers
//!
//! Availability queries for the booking calendar. The client first fetches
//! the policy to know which days to enable, then asks for the free times of
//! the chosen day.

use std::sync::Arc;

use axum::{Json, extract::State};
use chrono::NaiveDate;
use openhouse_core::models::slot::{AvailableSlotsResponse, SlotPolicyResponse};
use serde::Deserialize;

use crate::{
    ApiState,
    middleware::error_handling::{AppError, QueryParams},
};

/// Query parameters for the slot listing endpoint
#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    /// Day to list, `YYYY-MM-DD`
    pub date: NaiveDate,
}

/// Returns the booking policy
///
/// # Endpoint
///
/// ```text
/// GET /api/slots/policy
/// ```
#[axum::debug_handler]
pub async fn get_policy(State(state): State<Arc<ApiState>>) -> Json<SlotPolicyResponse> {
    Json(state.allocator.policy().to_response())
}

/// Lists free and taken times for one day
///
/// # Endpoint
///
/// ```text
/// GET /api/slots?date=2025-08-18
/// ```
///
/// `allowed` is false for days outside the policy; the lists are still
/// computed but clients should not offer those times.
///
/// # Errors
///
/// * `BookingError::StoreUnavailable` - the store could not be read
#[axum::debug_handler]
pub async fn list_slots(
    State(state): State<Arc<ApiState>>,
    QueryParams(query): QueryParams<SlotsQuery>,
) -> Result<Json<AvailableSlotsResponse>, AppError> {
    let allocator = &state.allocator;

    let booked = allocator.booked_times(query.date).await?;
    let available = allocator.free_times(&booked);

    let response = AvailableSlotsResponse {
        date: query.date,
        allowed: allocator.policy().is_allowed_date(query.date),
        available,
        booked,
    };

    Ok(Json(response))
}

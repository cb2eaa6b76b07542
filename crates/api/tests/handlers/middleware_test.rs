use axum::http::StatusCode;
use openhouse_api::middleware::error_handling::map_error;
use openhouse_core::errors::BookingError;
use openhouse_core::store::StoreError;
use rstest::rstest;

#[rstest]
#[case(BookingError::NotFound("Application with ID 1 not found".into()), StatusCode::NOT_FOUND)]
#[case(BookingError::Validation("Invalid time '25:00'".into()), StatusCode::BAD_REQUEST)]
#[case(BookingError::Conflict("The slot is already taken".into()), StatusCode::CONFLICT)]
#[case(
    BookingError::StoreUnavailable("pool timed out".into()),
    StatusCode::SERVICE_UNAVAILABLE
)]
#[case(
    BookingError::Database(eyre::eyre!("relation does not exist")),
    StatusCode::INTERNAL_SERVER_ERROR
)]
#[case(
    BookingError::Internal("corrupt record".into()),
    StatusCode::INTERNAL_SERVER_ERROR
)]
fn test_error_status_mapping(#[case] error: BookingError, #[case] expected: StatusCode) {
    let response = map_error(error);
    assert_eq!(response.status(), expected);
}

#[test]
fn test_transient_store_error_maps_to_service_unavailable() {
    let error = BookingError::from(StoreError::Unavailable("connection reset".into()));
    assert_eq!(map_error(error).status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[test]
fn test_backend_store_error_maps_to_internal_error() {
    let error = BookingError::from(StoreError::Backend(eyre::eyre!("syntax error")));
    assert_eq!(map_error(error).status(), StatusCode::INTERNAL_SERVER_ERROR);
}

use axum::http::StatusCode;
use openhouse_core::models::slot::{AvailableSlotsResponse, SlotPolicyResponse};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::test_utils::TestContext;

#[tokio::test]
async fn test_policy_lists_open_house_days() {
    let ctx = TestContext::new();

    let response = ctx.server.get("/api/slots/policy").await;

    response.assert_status_ok();
    let policy: SlotPolicyResponse = response.json();
    assert_eq!(policy.dates.len(), 7);
    assert_eq!(policy.day_start.to_string(), "10:00");
    assert_eq!(policy.day_end.to_string(), "16:00");
    assert_eq!(policy.granularity_minutes, 5);
}

#[tokio::test]
async fn test_empty_day_has_68_slots() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .get("/api/slots")
        .add_query_param("date", "2025-08-18")
        .await;

    response.assert_status_ok();
    let slots: AvailableSlotsResponse = response.json();
    assert!(slots.allowed);
    assert_eq!(slots.available.len(), 68);
    assert!(slots.booked.is_empty());
}

#[tokio::test]
async fn test_booked_slot_moves_between_lists() {
    let ctx = TestContext::new();
    ctx.server
        .post("/api/applications")
        .json(&json!({
            "appointmentDate": "2025-08-18",
            "appointmentTime": "10:00",
            "studentName": "Ayşe Yılmaz"
        }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = ctx
        .server
        .get("/api/slots")
        .add_query_param("date", "2025-08-18")
        .await;

    let slots: AvailableSlotsResponse = response.json();
    assert_eq!(slots.available.len(), 67);
    assert_eq!(
        slots.booked.iter().map(ToString::to_string).collect::<Vec<_>>(),
        vec!["10:00"]
    );
    assert!(!slots.available.iter().any(|time| time.to_string() == "10:00"));
}

#[tokio::test]
async fn test_unlisted_date_is_flagged() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .get("/api/slots")
        .add_query_param("date", "2025-12-01")
        .await;

    response.assert_status_ok();
    let slots: AvailableSlotsResponse = response.json();
    assert!(!slots.allowed);
}

#[tokio::test]
async fn test_missing_or_malformed_date_is_rejected() {
    let ctx = TestContext::new();

    let missing = ctx.server.get("/api/slots").await;
    let malformed = ctx
        .server
        .get("/api/slots")
        .add_query_param("date", "18.08.2025")
        .await;

    assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(malformed.status_code(), StatusCode::BAD_REQUEST);
    assert!(missing.json::<serde_json::Value>()["error"].is_string());
    assert!(malformed.json::<serde_json::Value>()["error"].is_string());
}

#[tokio::test]
async fn test_health_and_version() {
    let ctx = TestContext::new();

    let health = ctx.server.get("/health").await;
    let ready = ctx.server.get("/health/ready").await;
    let version = ctx.server.get("/version").await;

    health.assert_status_ok();
    health.assert_json(&json!({ "status": "ok" }));
    ready.assert_json(&json!({ "status": "ready" }));
    version.assert_json(&json!({ "version": env!("CARGO_PKG_VERSION") }));
}

use std::sync::Arc;

use axum::http::StatusCode;
use fake::Fake;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use openhouse_core::models::application::{Application, CancelApplicationResponse, FieldValue};
use openhouse_core::store::{MockKvStore, StoreError};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use crate::test_utils::{TestContext, server_with_store};

fn submission(date: &str, time: &str) -> Value {
    let student: String = Name().fake();
    let guardian: String = Name().fake();
    let email: String = SafeEmail().fake();

    json!({
        "appointmentDate": date,
        "appointmentTime": time,
        "studentName": student,
        "studentTC": "12345678901",
        "guardianName": guardian,
        "guardianEmail": email,
        "guardianPhoneCell": "05551234567",
        "lgsScore": 471.25,
        "mathCorrect": 18,
        "supportSchool": true
    })
}

async fn create(ctx: &TestContext, date: &str, time: &str) -> Application {
    let response = ctx
        .server
        .post("/api/applications")
        .json(&submission(date, time))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

#[tokio::test]
async fn test_create_application_returns_record() {
    let ctx = TestContext::new();
    let body = submission("2025-08-19", "14:35");

    let response = ctx.server.post("/api/applications").json(&body).await;

    response.assert_status(StatusCode::CREATED);
    let created: Value = response.json();
    assert_eq!(created["appointmentDate"], json!("2025-08-19"));
    assert_eq!(created["appointmentTime"], json!("14:35"));
    assert_eq!(created["studentName"], body["studentName"]);
    assert_eq!(created["lgsScore"], json!(471.25));
    assert_eq!(created["supportSchool"], json!(true));
    assert!(created["id"].as_str().is_some());
    assert!(created["createdAt"].as_str().is_some());
}

#[tokio::test]
async fn test_double_booking_is_a_conflict() {
    let ctx = TestContext::new();
    create(&ctx, "2025-08-18", "10:00").await;

    let response = ctx
        .server
        .post("/api/applications")
        .json(&submission("2025-08-18", "10:00"))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("already taken"));

    let listed: Vec<Application> = ctx.server.get("/api/applications").await.json();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_off_grid_time_is_rejected() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/api/applications")
        .json(&submission("2025-08-18", "12:05"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(ctx.store.is_empty().await);
}

#[tokio::test]
async fn test_malformed_time_is_a_bad_request() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/api/applications")
        .json(&submission("2025-08-18", "10 o'clock"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().is_some());
    assert!(ctx.store.is_empty().await);
}

#[tokio::test]
async fn test_unparseable_body_gets_json_error() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/api/applications")
        .bytes("{\"appointmentDate\": ".into())
        .content_type("application/json")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_list_applications_newest_first() {
    let ctx = TestContext::new();
    let first = create(&ctx, "2025-08-18", "10:00").await;
    let second = create(&ctx, "2025-08-18", "10:05").await;

    let listed: Vec<Application> = ctx.server.get("/api/applications").await.json();

    let ids: Vec<_> = listed.iter().map(|application| application.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
}

#[tokio::test]
async fn test_get_application_accepts_store_key_form() {
    let ctx = TestContext::new();
    let created = create(&ctx, "2025-08-20", "11:15").await;

    let plain = ctx.server.get(&format!("/api/applications/{}", created.id)).await;
    let keyed = ctx.server.get(&format!("/api/applications/{}", created.id.key())).await;

    plain.assert_status_ok();
    keyed.assert_status_ok();
    assert_eq!(plain.json::<Application>(), created);
    assert_eq!(keyed.json::<Application>(), created);
}

#[tokio::test]
async fn test_get_unknown_application_is_not_found() {
    let ctx = TestContext::new();

    let response = ctx.server.get("/api/applications/1723971600000").await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_id_is_rejected() {
    let ctx = TestContext::new();

    let response = ctx.server.get("/api/applications/not-an-id").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("not-an-id"));
}

#[tokio::test]
async fn test_update_replaces_payload_in_place() {
    let ctx = TestContext::new();
    let created = create(&ctx, "2025-08-21", "13:00").await;

    let response = ctx
        .server
        .put(&format!("/api/applications/{}", created.id))
        .json(&json!({
            "id": created.id.to_string(),
            "createdAt": "2000-01-01T00:00:00Z",
            "appointmentDate": "2025-08-21",
            "appointmentTime": "13:00",
            "studentName": "Düzeltilmiş Ad",
            "hobbies": "satranç"
        }))
        .await;

    response.assert_status_ok();
    let updated: Application = response.json();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.created_at, created.created_at);
    assert_eq!(
        updated.payload.get("studentName"),
        Some(&FieldValue::Text("Düzeltilmiş Ad".to_string()))
    );
    assert!(updated.payload.get("guardianEmail").is_none());

    let listed: Vec<Application> = ctx.server.get("/api/applications").await.json();
    assert_eq!(listed, vec![updated]);
}

#[tokio::test]
async fn test_update_onto_taken_slot_is_a_conflict() {
    let ctx = TestContext::new();
    create(&ctx, "2025-08-25", "10:00").await;
    let other = create(&ctx, "2025-08-25", "10:05").await;

    let response = ctx
        .server
        .put(&format!("/api/applications/{}", other.id))
        .json(&json!({ "appointmentTime": "10:00", "studentName": "B" }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let unchanged: Application = ctx
        .server
        .get(&format!("/api/applications/{}", other.id))
        .await
        .json();
    assert_eq!(unchanged, other);
}

#[tokio::test]
async fn test_update_unknown_application_is_not_found() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .put("/api/applications/42")
        .json(&json!({ "studentName": "Nobody" }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_frees_slot() {
    let ctx = TestContext::new();
    let created = create(&ctx, "2025-08-26", "15:55").await;

    let response = ctx
        .server
        .delete(&format!("/api/applications/{}", created.id))
        .await;

    response.assert_status_ok();
    let cancelled: CancelApplicationResponse = response.json();
    assert_eq!(cancelled.id, created.id);
    assert!(ctx.store.is_empty().await);

    create(&ctx, "2025-08-26", "15:55").await;
}

#[tokio::test]
async fn test_delete_twice_is_not_found() {
    let ctx = TestContext::new();
    let created = create(&ctx, "2025-08-26", "10:30").await;
    let path = format!("/api/applications/{}", created.id);

    ctx.server.delete(&path).await.assert_status_ok();
    let second = ctx.server.delete(&path).await;

    second.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_store_outage_is_service_unavailable() {
    let mut store = MockKvStore::new();
    store
        .expect_scan()
        .returning(|_| Err(StoreError::Unavailable("connection refused".to_string())));
    let server = server_with_store(Arc::new(store));

    let listing = server.get("/api/applications").await;
    let slots = server
        .get("/api/slots")
        .add_query_param("date", "2025-08-18")
        .await;
    let ready = server.get("/health/ready").await;

    listing.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    slots.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    ready.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_transient_failure_is_retried_transparently() {
    let mut store = MockKvStore::new();
    let mut failed_once = false;
    store.expect_scan().times(2).returning(move |_| {
        if failed_once {
            return Ok(Vec::new());
        }
        failed_once = true;
        Err(StoreError::Unavailable("reset by peer".to_string()))
    });
    let server = server_with_store(Arc::new(store));

    let response = server.get("/api/applications").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Vec<Application>>(), Vec::new());
}

//! API integration tests driven through the router.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use dialer_api::routes::create_router;
use dialer_api::state::{ApiConfig, AppState};
use dialer_core::config::DialerConfig;

const CRON_SECRET: &str = "test-secret";

fn test_app() -> Router {
    let api_config = ApiConfig {
        cron_secret: CRON_SECRET.to_string(),
        ..ApiConfig::default()
    };
    let state = AppState::new(api_config, DialerConfig::development()).unwrap();
    create_router(state)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, value: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&value).unwrap()))
        .unwrap()
}

fn patch_json(uri: &str, value: Value) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&value).unwrap()))
        .unwrap()
}

fn put_json(uri: &str, value: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&value).unwrap()))
        .unwrap()
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = test_app();

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");

    let response = app.oneshot(get("/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cron_rejects_missing_secret() {
    let app = test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/cron/outbound-calls")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_cron_rejects_wrong_secret() {
    let app = test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/cron/outbound-calls")
        .header("x-cron-secret", "wrong")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cron_runs_with_valid_secret() {
    let app = test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/cron/outbound-calls")
        .header("x-cron-secret", CRON_SECRET)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["processed"], 0);
    assert_eq!(body["errors"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_campaign_lifecycle() {
    let app = test_app();

    // Create
    let response = app
        .clone()
        .oneshot(post_json(
            "/campaigns",
            json!({
                "owner_id": "owner-1",
                "name": "Spring promo",
                "script": "Hi {{first_name}}",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    assert_eq!(created["status"], "draft");
    let campaign_id = created["id"].as_str().unwrap().to_string();

    // Activate
    let response = app
        .clone()
        .oneshot(patch_json(
            &format!("/campaigns/{campaign_id}"),
            json!({ "status": "active" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "active");

    // Get
    let response = app
        .clone()
        .oneshot(get(&format!("/campaigns/{campaign_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["name"], "Spring promo");

    // Invalid status rejected
    let response = app
        .oneshot(patch_json(
            &format!("/campaigns/{campaign_id}"),
            json!({ "status": "deleted" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_campaign_not_found() {
    let app = test_app();
    let response = app.oneshot(get("/campaigns/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_enrollment_conflict_reported_per_contact() {
    let app = test_app();

    let response = app
        .clone()
        .oneshot(post_json(
            "/campaigns",
            json!({ "owner_id": "owner-1", "name": "Promo", "script": "Hi" }),
        ))
        .await
        .unwrap();
    let campaign_id = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            "/contacts",
            json!({ "owner_id": "owner-1", "name": "Ada Lovelace", "phone": "555-123-4567" }),
        ))
        .await
        .unwrap();
    let contact_id = body_json(response).await["id"].as_str().unwrap().to_string();

    // First enrollment succeeds
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/campaigns/{campaign_id}/enrollments"),
            json!({ "contact_ids": [contact_id] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["enrolled"].as_array().unwrap().len(), 1);
    assert_eq!(body["conflicts"].as_array().unwrap().len(), 0);
    let enrollment_id = body["enrolled"][0].as_str().unwrap().to_string();

    // Second enrollment of the same contact is a per-contact conflict
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/campaigns/{campaign_id}/enrollments"),
            json!({ "contact_ids": [contact_id] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["enrolled"].as_array().unwrap().len(), 0);
    assert_eq!(body["conflicts"].as_array().unwrap().len(), 1);

    // Enrollment is visible
    let response = app
        .oneshot(get(&format!("/enrollments/{enrollment_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "queued");
    assert_eq!(body["attempt_count"], 0);
}

#[tokio::test]
async fn test_credits_surface() {
    let app = test_app();

    // Starts empty
    let response = app.clone().oneshot(get("/credits/owner-1")).await.unwrap();
    assert_eq!(body_json(response).await["balance"], 0);

    // Add
    let response = app
        .clone()
        .oneshot(post_json("/credits/owner-1/add", json!({ "amount": 100 })))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["balance"], 100);

    // Consume within balance
    let response = app
        .clone()
        .oneshot(post_json("/credits/owner-1/consume", json!({ "amount": 30 })))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["balance"], 70);

    // Consume beyond balance is reported, not applied
    let response = app
        .clone()
        .oneshot(post_json("/credits/owner-1/consume", json!({ "amount": 500 })))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["ok"], false);
    assert_eq!(body["balance"], 70);

    // Auto-top-up toggle
    let response = app
        .oneshot(post_json(
            "/credits/owner-1/auto-top-up",
            json!({ "enabled": true }),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["auto_top_up"], true);
}

#[tokio::test]
async fn test_provider_settings_put() {
    let app = test_app();

    let response = app
        .oneshot(put_json(
            "/owners/owner-1/provider-settings",
            json!({ "voice_agent_api_key": "va-key", "outbound_number": "+15550001111" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);
}

#[tokio::test]
async fn test_manual_call_requires_credits() {
    let app = test_app();

    let response = app
        .clone()
        .oneshot(post_json(
            "/contacts",
            json!({ "owner_id": "owner-1", "name": "Ada Lovelace", "phone": "555-123-4567" }),
        ))
        .await
        .unwrap();
    let contact_id = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(post_json(
            "/calls",
            json!({
                "owner_id": "owner-1",
                "contact_id": contact_id,
                "script": "Hello",
                "idempotency_key": "manual-1",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body_json(response).await["code"], "INSUFFICIENT_CREDITS");
}

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;

use common::{read_json, TestApp};
use warehouse_api::auth::{AuthConfig, AuthService, Role};

#[tokio::test]
async fn health_and_status_are_public() {
    let app = TestApp::new().await;

    let (status, body) = read_json(app.request(Method::GET, "/api/v1/health", None, None).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["checks"]["database"], "healthy");

    let (status, body) = read_json(app.request(Method::GET, "/api/v1/status", None, None).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["service"], "warehouse-api");
    assert_eq!(body["data"]["environment"], "test");
}

#[tokio::test]
async fn workflow_routes_require_a_token() {
    let app = TestApp::new().await;

    let (status, body) = read_json(
        app.request(Method::GET, "/api/v1/inventory", None, None)
            .await,
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);
}

#[tokio::test]
async fn tokens_signed_with_another_secret_are_rejected() {
    let app = TestApp::new().await;
    let foreign = AuthService::new(AuthConfig::new(
        "a_completely_different_secret_of_32_chars".to_string(),
        "warehouse-api".to_string(),
        "warehouse-identity".to_string(),
        3600,
    ));
    let token = foreign
        .issue_token(Uuid::new_v4(), Role::Admin)
        .expect("foreign token");

    let (status, _) = app.call_as(&token, Method::GET, "/api/v1/inventory", None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn manager_routes_reject_staff_and_accept_admins() {
    let app = TestApp::new().await;
    let payload = json!({ "code": "A-01", "name": "Aisle A", "locationType": "STORAGE" });

    let staff = app.staff_token().to_string();
    let (status, body) = app
        .call_as(&staff, Method::POST, "/api/v1/locations", Some(payload.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], 403);

    let admin = app
        .auth_service()
        .issue_token(Uuid::new_v4(), Role::Admin)
        .expect("admin token");
    let (status, body) = app
        .call_as(&admin, Method::POST, "/api/v1/locations", Some(payload))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["code"], "A-01");
    assert_eq!(body["data"]["is_active"], true);
}

#[tokio::test]
async fn staff_can_use_worker_routes() {
    let app = TestApp::new().await;
    let staff = app.staff_token().to_string();

    let (status, body) = app
        .call_as(&staff, Method::GET, "/api/v1/inventory/transfers/pending", None)
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn duplicate_location_codes_are_rejected() {
    let app = TestApp::new().await;
    let payload = json!({ "code": "A-01", "name": "Aisle A", "locationType": "STORAGE" });

    let (first, _) = app.post("/api/v1/locations", payload.clone()).await;
    let (second, _) = app.post("/api/v1/locations", payload).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post("/api/v1/orders", json!({ "customerName": 42 }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn unknown_routes_return_json_not_found() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/api/v1/no-such-thing").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn responses_echo_the_request_id() {
    let app = TestApp::new().await;
    let request = axum::http::Request::builder()
        .method(Method::GET)
        .uri("/api/v1/status")
        .header("x-request-id", "trace-me-123")
        .body(axum::body::Body::empty())
        .expect("request");

    let response = app.send(request).await;

    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("trace-me-123")
    );
    let (_, body) = read_json(response).await;
    assert_eq!(body["meta"]["request_id"], "trace-me-123");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;

    let (status, body) = read_json(
        app.request(Method::GET, "/api-docs/openapi.json", None, None)
            .await,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/v1/orders/actions"].is_object());
    assert!(body["paths"]["/api/v1/returns/{rma}/process-refund"].is_object());
}

mod common;

use axum::http::StatusCode;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::TestApp;
use warehouse_api::models::{
    audit_event,
    location::LocationType,
    order::OrderStatus,
    pending_sync::{self, SyncStatus},
};
use warehouse_api::services::allocation::AllocationMode;

#[tokio::test]
async fn create_order_defaults_number_and_prices() {
    let app = TestApp::new().await;
    let variant = app.seed_variant("LAMP", Decimal::new(2500, 2)).await;

    let (status, body) = app
        .post(
            "/api/v1/orders",
            json!({
                "customerName": "Ada Lovelace",
                "items": [{ "variantId": variant.id, "quantity": 2 }],
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["order"]["status"], "PENDING");
    assert!(body["data"]["order"]["order_number"]
        .as_str()
        .unwrap_or_default()
        .starts_with("SO-"));
    assert_eq!(body["data"]["items"][0]["quantity"], 2);
    assert_eq!(body["data"]["items"][0]["quantity_allocated"], 0);

    let order_id = common::id_of(&body["data"]["order"]["id"]);
    let audits = audit_event::Entity::find()
        .filter(audit_event::Column::EntityId.eq(order_id))
        .all(&*app.state.db)
        .await
        .expect("audit query");
    assert!(audits.iter().any(|a| a.action == "ORDER_CREATED"));
}

#[tokio::test]
async fn create_order_with_unknown_variant_is_not_found() {
    let app = TestApp::new().await;

    let (status, _) = app
        .post(
            "/api/v1/orders",
            json!({
                "customerName": "Ada Lovelace",
                "items": [{ "variantId": Uuid::new_v4(), "quantity": 1 }],
            }),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_order_rejects_empty_items() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post(
            "/api/v1/orders",
            json!({ "customerName": "Ada Lovelace", "items": [] }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn missing_order_is_not_found() {
    let app = TestApp::new().await;

    let (status, body) = app
        .get(&format!("/api/v1/orders/{}", Uuid::new_v4()))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["reason"], "Not Found");
}

#[tokio::test]
async fn mark_fulfilled_requires_a_packed_order() {
    let app = TestApp::new().await;
    let variant = app.seed_variant("LAMP", Decimal::new(2500, 2)).await;
    let order = app.seed_order(&[(variant.id, 1)]).await;

    let (status, _) = app
        .post(
            "/api/v1/orders/actions",
            json!({ "action": "MARK_FULFILLED", "orderId": order.order.id }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Walks an order to PACKED through the services.
async fn packed_order(app: &TestApp) -> Uuid {
    let loc = app.seed_location("A-01", LocationType::Picking).await;
    let variant = app.seed_variant("LAMP", Decimal::new(2500, 2)).await;
    app.receive(variant.id, loc.id, 5).await;
    let order = app.seed_order(&[(variant.id, 2)]).await;
    let order_id = order.order.id;
    let services = &app.state.services;
    let actor = app.manager_id;

    services
        .allocation
        .allocate(order_id, AllocationMode::Strict, actor)
        .await
        .expect("allocate");
    let pick = services
        .picking
        .generate_pick_list(vec![order_id], actor)
        .await
        .expect("pick list");
    let (status, _) = app
        .post(
            &format!(
                "/api/v1/pick-lists/{}/items/{}/pick",
                pick.pick_list.id, pick.items[0].id
            ),
            json!({ "quantityPicked": 2, "scannedCode": "BC-LAMP" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, packing) = app
        .post("/api/v1/tasks/packing", json!({ "orderIds": [order_id] }))
        .await;
    let task_id = common::id_of(&packing["data"]["task"]["id"]);
    let item_id = common::id_of(&packing["data"]["items"][0]["id"]);
    let (status, _) = app
        .post(
            &format!("/api/v1/tasks/{}/items/{}/complete", task_id, item_id),
            json!({ "quantity": 2, "scannedCode": "BC-LAMP" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    order_id
}

#[tokio::test]
async fn shipment_is_pushed_to_the_fulfillment_platform() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fulfillments"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;
    let app = TestApp::with_fulfillment_url(&server.uri()).await;
    let order_id = packed_order(&app).await;

    let (status, body) = app
        .post(
            "/api/v1/orders/actions",
            json!({ "action": "MARK_FULFILLED", "orderId": order_id }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["synced"], true);
    assert!(body["data"]["pending_sync_id"].is_null());
    assert!(body["data"]["order"]["shipped_at"].is_string());
}

#[tokio::test]
async fn failed_push_keeps_the_shipment_and_records_a_pending_sync() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fulfillments"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let app = TestApp::with_fulfillment_url(&server.uri()).await;
    let order_id = packed_order(&app).await;

    let (status, body) = app
        .post(
            "/api/v1/orders/actions",
            json!({ "action": "MARK_FULFILLED", "orderId": order_id }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["order"]["status"], "SHIPPED");
    assert_eq!(body["data"]["synced"], false);

    let syncs = pending_sync::Entity::find()
        .filter(pending_sync::Column::ReferenceId.eq(order_id))
        .all(&*app.state.db)
        .await
        .expect("pending sync query");
    assert_eq!(syncs.len(), 1);
    assert_eq!(syncs[0].status, SyncStatus::Pending);
    assert_eq!(syncs[0].payload["status"], "SHIPPED");
    assert_eq!(syncs[0].payload["lines"][0]["sku"], "LAMP");
    assert_eq!(
        body["data"]["pending_sync_id"],
        json!(syncs[0].id),
    );

    let order = app
        .state
        .services
        .orders
        .get_order(order_id)
        .await
        .expect("order detail");
    assert_eq!(order.order.status, OrderStatus::Shipped);
}

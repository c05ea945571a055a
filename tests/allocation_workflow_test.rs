mod common;

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::json;

use common::{id_of, TestApp};
use warehouse_api::models::location::LocationType;

#[tokio::test]
async fn strict_allocation_reserves_stock_and_allocates_order() {
    let app = TestApp::new().await;
    let loc = app.seed_location("A-01", LocationType::Storage).await;
    let variant = app.seed_variant("WIDGET", Decimal::new(1000, 2)).await;
    app.receive(variant.id, loc.id, 10).await;
    let order = app.seed_order(&[(variant.id, 4)]).await;

    let (status, body) = app
        .post(
            "/api/v1/orders/actions",
            json!({ "action": "ALLOCATE", "orderId": order.order.id }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ALLOCATED");
    assert_eq!(body["data"]["previous_status"], "PENDING");
    assert_eq!(body["data"]["allocated_units"], 4);
    assert_eq!(body["data"]["locations"], 1);

    let row = app.inventory_row(variant.id, loc.id).await;
    assert_eq!(row.quantity_on_hand, 10);
    assert_eq!(row.quantity_reserved, 4);

    let (_, detail) = app.get(&format!("/api/v1/orders/{}", order.order.id)).await;
    assert_eq!(detail["data"]["order"]["status"], "ALLOCATED");
    assert_eq!(detail["data"]["items"][0]["quantity_allocated"], 4);
    assert_eq!(detail["data"]["allocations"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn strict_allocation_fails_without_side_effects_when_short() {
    let app = TestApp::new().await;
    let loc = app.seed_location("A-01", LocationType::Storage).await;
    let variant = app.seed_variant("WIDGET", Decimal::new(1000, 2)).await;
    app.receive(variant.id, loc.id, 3).await;
    let order = app.seed_order(&[(variant.id, 5)]).await;

    let (status, body) = app
        .post(
            "/api/v1/orders/actions",
            json!({ "action": "ALLOCATE", "orderId": order.order.id }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
    assert_eq!(body["reason"], "Bad Request");
    assert!(body["error"].as_str().unwrap_or_default().contains("short by 2"));

    let row = app.inventory_row(variant.id, loc.id).await;
    assert_eq!(row.quantity_reserved, 0);
    let (_, detail) = app.get(&format!("/api/v1/orders/{}", order.order.id)).await;
    assert_eq!(detail["data"]["order"]["status"], "PENDING");
}

#[tokio::test]
async fn allocation_spreads_across_locations_largest_first() {
    let app = TestApp::new().await;
    let small = app.seed_location("A-01", LocationType::Storage).await;
    let large = app.seed_location("B-01", LocationType::Storage).await;
    let variant = app.seed_variant("WIDGET", Decimal::new(1000, 2)).await;
    app.receive(variant.id, small.id, 4).await;
    app.receive(variant.id, large.id, 6).await;
    let order = app.seed_order(&[(variant.id, 8)]).await;

    let (status, body) = app
        .post(
            "/api/v1/orders/actions",
            json!({ "action": "ALLOCATE", "orderId": order.order.id }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["locations"], 2);
    assert_eq!(app.inventory_row(variant.id, large.id).await.quantity_reserved, 6);
    assert_eq!(app.inventory_row(variant.id, small.id).await.quantity_reserved, 2);
}

#[tokio::test]
async fn backorder_allocation_reserves_what_exists_and_records_the_rest() {
    let app = TestApp::new().await;
    let loc = app.seed_location("A-01", LocationType::Storage).await;
    let variant = app.seed_variant("WIDGET", Decimal::new(1000, 2)).await;
    app.receive(variant.id, loc.id, 3).await;
    let order = app.seed_order(&[(variant.id, 5)]).await;

    let (status, body) = app
        .post(
            "/api/v1/orders/actions",
            json!({ "action": "ALLOCATE_WITH_BACKORDER", "orderId": order.order.id }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "ALLOCATED");
    assert_eq!(body["data"]["allocated_units"], 3);
    assert_eq!(body["data"]["backorder_ids"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"]["shortages"][0]["short"], 2);

    let (_, detail) = app.get(&format!("/api/v1/orders/{}", order.order.id)).await;
    assert_eq!(detail["data"]["backorders"][0]["quantity_short"], 2);
    assert_eq!(app.inventory_row(variant.id, loc.id).await.quantity_reserved, 3);
}

#[tokio::test]
async fn count_allocation_opens_a_cycle_count_and_leaves_order_pending() {
    let app = TestApp::new().await;
    let loc = app.seed_location("A-01", LocationType::Storage).await;
    let variant = app.seed_variant("WIDGET", Decimal::new(1000, 2)).await;
    app.receive(variant.id, loc.id, 3).await;
    let order = app.seed_order(&[(variant.id, 5)]).await;

    let (status, body) = app
        .post(
            "/api/v1/orders/actions",
            json!({ "action": "ALLOCATE_WITH_COUNT", "orderId": order.order.id }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "PENDING");
    assert_eq!(body["data"]["allocated_units"], 0);
    let campaign_id = id_of(&body["data"]["cycle_count_campaign_id"]);

    let (status, campaign) = app
        .get(&format!("/api/v1/inventory/cycle-counts/{}", campaign_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(campaign["data"]["campaign"]["source_order_id"], json!(order.order.id));
    assert_eq!(campaign["data"]["tasks"].as_array().map(Vec::len), Some(1));
    assert_eq!(campaign["data"]["tasks"][0]["system_quantity"], 3);

    assert_eq!(app.inventory_row(variant.id, loc.id).await.quantity_reserved, 0);
}

#[tokio::test]
async fn allocating_twice_is_rejected() {
    let app = TestApp::new().await;
    let loc = app.seed_location("A-01", LocationType::Storage).await;
    let variant = app.seed_variant("WIDGET", Decimal::new(1000, 2)).await;
    app.receive(variant.id, loc.id, 10).await;
    let order = app.seed_order(&[(variant.id, 2)]).await;
    let request = json!({ "action": "ALLOCATE", "orderId": order.order.id });

    let (first, _) = app.post("/api/v1/orders/actions", request.clone()).await;
    let (second, body) = app.post("/api/v1/orders/actions", request).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap_or_default().starts_with("Conflict"));
    assert_eq!(app.inventory_row(variant.id, loc.id).await.quantity_reserved, 2);
}

#[tokio::test]
async fn single_order_actions_require_an_order_id() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post("/api/v1/orders/actions", json!({ "action": "ALLOCATE" }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap_or_default().contains("orderId"));
}

#[tokio::test]
async fn bulk_allocate_reports_successes_and_failures() {
    let app = TestApp::new().await;
    let loc = app.seed_location("A-01", LocationType::Storage).await;
    let variant = app.seed_variant("WIDGET", Decimal::new(1000, 2)).await;
    app.receive(variant.id, loc.id, 5).await;
    let fits = app.seed_order(&[(variant.id, 4)]).await;
    let too_big = app.seed_order(&[(variant.id, 4)]).await;

    let (status, body) = app
        .post(
            "/api/v1/orders/actions",
            json!({
                "action": "BULK_ALLOCATE",
                "orderIds": [fits.order.id, too_big.order.id],
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["successful"], 1);
    assert_eq!(body["data"]["failed"], 1);
    assert_eq!(body["data"]["results"][0]["success"], true);
    assert_eq!(body["data"]["results"][1]["success"], false);
    assert!(body["data"]["results"][1]["error"].is_string());
}

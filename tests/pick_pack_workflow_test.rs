mod common;

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use common::{id_of, TestApp};
use warehouse_api::models::location::LocationType;
use warehouse_api::notifications::NotificationType;
use warehouse_api::services::allocation::AllocationMode;

struct Floor {
    app: TestApp,
    variant_id: Uuid,
    location_id: Uuid,
}

/// `A-01` (barcode `LOC-A-01`) holding 10 units of `WIDGET` (barcode `BC-WIDGET`).
async fn stocked_floor() -> Floor {
    let app = TestApp::new().await;
    let loc = app.seed_location("A-01", LocationType::Picking).await;
    let variant = app.seed_variant("WIDGET", Decimal::new(1000, 2)).await;
    app.receive(variant.id, loc.id, 10).await;
    Floor {
        app,
        variant_id: variant.id,
        location_id: loc.id,
    }
}

async fn allocated_order(floor: &Floor, quantity: i32) -> Uuid {
    let order = floor.app.seed_order(&[(floor.variant_id, quantity)]).await;
    floor
        .app
        .state
        .services
        .allocation
        .allocate(order.order.id, AllocationMode::Strict, floor.app.manager_id)
        .await
        .expect("allocate order");
    order.order.id
}

async fn single_pick(floor: &Floor, order_id: Uuid) -> Value {
    let (status, body) = floor
        .app
        .post(
            "/api/v1/orders/actions",
            json!({ "action": "GENERATE_SINGLE_PICK", "orderId": order_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"].clone()
}

async fn order_status(app: &TestApp, order_id: Uuid) -> Value {
    let (_, body) = app.get(&format!("/api/v1/orders/{}", order_id)).await;
    body["data"]["order"]["status"].clone()
}

#[tokio::test]
async fn generating_a_pick_list_moves_order_to_picking() {
    let floor = stocked_floor().await;
    let order_id = allocated_order(&floor, 4).await;

    let pick = single_pick(&floor, order_id).await;

    assert_eq!(pick["pick_list"]["status"], "PENDING");
    assert_eq!(pick["pick_list"]["total_items"], 1);
    assert_eq!(pick["items"][0]["quantity_to_pick"], 4);
    assert_eq!(pick["items"][0]["pick_sequence"], 1);
    assert_eq!(order_status(&floor.app, order_id).await, "PICKING");
}

#[tokio::test]
async fn scan_mismatch_rejects_the_pick_and_changes_nothing() {
    let floor = stocked_floor().await;
    let order_id = allocated_order(&floor, 4).await;
    let pick = single_pick(&floor, order_id).await;
    let list_id = id_of(&pick["pick_list"]["id"]);
    let item_id = id_of(&pick["items"][0]["id"]);

    let (status, body) = floor
        .app
        .post(
            &format!("/api/v1/pick-lists/{}/items/{}/pick", list_id, item_id),
            json!({ "quantityPicked": 4, "scannedCode": "SOMETHING-ELSE" }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap_or_default().contains("does not match"));

    let (_, list) = floor
        .app
        .get(&format!("/api/v1/pick-lists/{}", list_id))
        .await;
    assert_eq!(list["data"]["pick_list"]["picked_items"], 0);
    assert_eq!(list["data"]["items"][0]["status"], "PENDING");

    let row = floor.app.inventory_row(floor.variant_id, floor.location_id).await;
    assert_eq!(row.quantity_on_hand, 10);
    assert_eq!(row.quantity_reserved, 4);
}

#[tokio::test]
async fn full_pick_completes_the_list_and_consumes_reserved_stock() {
    let floor = stocked_floor().await;
    let order_id = allocated_order(&floor, 4).await;
    let pick = single_pick(&floor, order_id).await;
    let list_id = id_of(&pick["pick_list"]["id"]);
    let item_id = id_of(&pick["items"][0]["id"]);

    let (status, body) = floor
        .app
        .post(
            &format!("/api/v1/pick-lists/{}/items/{}/pick", list_id, item_id),
            json!({ "quantityPicked": 4, "scannedCode": "  bc-widget " }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["item"]["status"], "COMPLETED");
    assert_eq!(body["data"]["pick_list"]["status"], "COMPLETED");
    assert_eq!(body["data"]["pick_list"]["picked_items"], 1);
    assert_eq!(body["data"]["orders_picked"], json!([order_id]));
    assert_eq!(order_status(&floor.app, order_id).await, "PICKED");

    let row = floor.app.inventory_row(floor.variant_id, floor.location_id).await;
    assert_eq!(row.quantity_on_hand, 6);
    assert_eq!(row.quantity_reserved, 0);
}

#[tokio::test]
async fn short_pick_releases_and_backorders_the_unpicked_remainder() {
    let floor = stocked_floor().await;
    let order_id = allocated_order(&floor, 4).await;
    let pick = single_pick(&floor, order_id).await;
    let list_id = id_of(&pick["pick_list"]["id"]);
    let item_id = id_of(&pick["items"][0]["id"]);

    let (status, body) = floor
        .app
        .post(
            &format!("/api/v1/pick-lists/{}/items/{}/pick", list_id, item_id),
            json!({ "quantityPicked": 3, "scannedCode": "LOC-A-01" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["item"]["status"], "SHORT_PICK");
    assert_eq!(body["data"]["item"]["quantity_picked"], 3);

    let row = floor.app.inventory_row(floor.variant_id, floor.location_id).await;
    assert_eq!(row.quantity_on_hand, 7);
    assert_eq!(row.quantity_reserved, 0);

    let (_, order) = floor.app.get(&format!("/api/v1/orders/{}", order_id)).await;
    let detail = &order["data"];
    assert_eq!(detail["items"][0]["quantity_allocated"], 3);
    let backorders = detail["backorders"].as_array().expect("backorders");
    assert_eq!(backorders.len(), 1);
    assert_eq!(backorders[0]["quantity_short"], 1);
    assert_eq!(backorders[0]["status"], "PENDING");
    assert_eq!(id_of(&backorders[0]["variant_id"]), floor.variant_id);
}

#[tokio::test]
async fn picking_more_than_required_is_rejected() {
    let floor = stocked_floor().await;
    let order_id = allocated_order(&floor, 4).await;
    let pick = single_pick(&floor, order_id).await;
    let list_id = id_of(&pick["pick_list"]["id"]);
    let item_id = id_of(&pick["items"][0]["id"]);

    let (status, _) = floor
        .app
        .post(
            &format!("/api/v1/pick-lists/{}/items/{}/pick", list_id, item_id),
            json!({ "quantityPicked": 5, "scannedCode": "BC-WIDGET" }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let row = floor.app.inventory_row(floor.variant_id, floor.location_id).await;
    assert_eq!(row.quantity_reserved, 4);
}

#[tokio::test]
async fn assigning_a_pick_list_notifies_the_picker() {
    let floor = stocked_floor().await;
    let order_id = allocated_order(&floor, 2).await;
    let pick = single_pick(&floor, order_id).await;
    let list_id = id_of(&pick["pick_list"]["id"]);
    let picker = Uuid::new_v4();

    let (status, body) = floor
        .app
        .post(
            &format!("/api/v1/pick-lists/{}/assign", list_id),
            json!({ "userId": picker }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "ASSIGNED");
    let sent = floor.app.notifications.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id, picker);
    assert_eq!(sent[0].notification_type, NotificationType::TaskAssigned);
}

#[tokio::test]
async fn pick_pack_and_ship_through_work_tasks() {
    let floor = stocked_floor().await;
    let order_id = allocated_order(&floor, 2).await;

    let (status, picking) = floor
        .app
        .post("/api/v1/tasks/picking", json!({ "orderIds": [order_id] }))
        .await;
    assert_eq!(status, StatusCode::OK, "{picking}");
    assert_eq!(picking["data"]["task"]["task_type"], "PICKING");
    assert_eq!(order_status(&floor.app, order_id).await, "PICKING");

    let task_id = id_of(&picking["data"]["task"]["id"]);
    let item_id = id_of(&picking["data"]["items"][0]["id"]);
    let (status, body) = floor
        .app
        .post(
            &format!("/api/v1/tasks/{}/items/{}/complete", task_id, item_id),
            json!({ "quantity": 2, "scannedCode": "BC-WIDGET" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["task"]["status"], "COMPLETED");
    assert_eq!(body["data"]["task"]["completed_items"], 1);
    assert_eq!(body["data"]["task"]["completed_orders"], 1);
    assert_eq!(order_status(&floor.app, order_id).await, "PICKED");

    let (status, packing) = floor
        .app
        .post("/api/v1/tasks/packing", json!({ "orderIds": [order_id] }))
        .await;
    assert_eq!(status, StatusCode::OK, "{packing}");
    assert_eq!(packing["data"]["items"][0]["quantity_required"], 2);

    let task_id = id_of(&packing["data"]["task"]["id"]);
    let item_id = id_of(&packing["data"]["items"][0]["id"]);
    let (status, body) = floor
        .app
        .post(
            &format!("/api/v1/tasks/{}/items/{}/complete", task_id, item_id),
            json!({ "quantity": 2, "scannedCode": "bc-widget" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["orders_advanced"], json!([order_id]));
    assert_eq!(order_status(&floor.app, order_id).await, "PACKED");

    let (status, shipped) = floor
        .app
        .post(
            "/api/v1/orders/actions",
            json!({ "action": "MARK_FULFILLED", "orderId": order_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{shipped}");
    assert_eq!(shipped["data"]["order"]["status"], "SHIPPED");
    assert_eq!(shipped["data"]["synced"], true);

    let (_, history) = floor
        .app
        .get(&format!("/api/v1/orders/{}/history", order_id))
        .await;
    let statuses: Vec<&str> = history["data"]
        .as_array()
        .map(|rows| rows.iter().filter_map(|r| r["to_status"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(
        statuses,
        ["PENDING", "ALLOCATED", "PICKING", "PICKED", "PACKED", "SHIPPED"]
    );

    let row = floor.app.inventory_row(floor.variant_id, floor.location_id).await;
    assert_eq!(row.quantity_on_hand, 8);
    assert_eq!(row.quantity_reserved, 0);
}

#[tokio::test]
async fn packing_requires_picked_orders() {
    let floor = stocked_floor().await;
    let order_id = allocated_order(&floor, 2).await;

    let (status, body) = floor
        .app
        .post("/api/v1/tasks/packing", json!({ "orderIds": [order_id] }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap_or_default().contains("expected PICKED"));
}

#[tokio::test]
async fn bulk_pick_generation_counts_each_order() {
    let floor = stocked_floor().await;
    let first = allocated_order(&floor, 2).await;
    let second = allocated_order(&floor, 3).await;
    let pending = floor.app.seed_order(&[(floor.variant_id, 1)]).await.order.id;

    let (status, body) = floor
        .app
        .post(
            "/api/v1/orders/actions",
            json!({ "action": "BULK_GENERATE_PICKS", "orderIds": [first, second, pending] }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["successful"], 2);
    assert_eq!(body["data"]["failed"], 1);
    assert!(body["data"]["results"][0]["pick_list_id"].is_string());
    assert_eq!(body["data"]["results"][2]["success"], false);
    assert_eq!(order_status(&floor.app, first).await, "PICKING");
    assert_eq!(order_status(&floor.app, pending).await, "PENDING");
}

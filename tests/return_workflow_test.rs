mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, Set};
use serde_json::{json, Value};
use uuid::Uuid;

use common::{id_of, TestApp};
use warehouse_api::models::{
    inventory_transaction::{self, TransactionType},
    location::{self, LocationType},
    order::{self, OrderStatus},
    return_order::{self, RefundStatus, ReturnStatus},
};

struct Shipped {
    app: TestApp,
    variant_id: Uuid,
    restock_location_id: Uuid,
    order_id: Uuid,
    order_item_id: Uuid,
}

/// Three units at $50.00 on an order that has already shipped.
async fn shipped_order() -> Shipped {
    let app = TestApp::new().await;
    let restock = app.seed_location("S-01", LocationType::Storage).await;
    let variant = app.seed_variant("BOOT", dec!(50.00)).await;
    let detail = app.seed_order(&[(variant.id, 3)]).await;

    let mut active = detail.order.clone().into_active_model();
    active.status = Set(OrderStatus::Shipped);
    active.update(&*app.state.db).await.expect("mark order shipped");

    Shipped {
        variant_id: variant.id,
        restock_location_id: restock.id,
        order_id: detail.order.id,
        order_item_id: detail.items[0].id,
        app,
    }
}

async fn open_return(s: &Shipped, quantity: i32) -> (String, Uuid) {
    let (status, body) = s
        .app
        .post(
            "/api/v1/returns",
            json!({
                "orderId": s.order_id,
                "reason": "Wrong size",
                "items": [{ "orderItemId": s.order_item_id, "quantity": quantity }],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["return_order"]["status"], "PENDING");
    let rma = body["data"]["return_order"]["rma_number"]
        .as_str()
        .expect("rma number")
        .to_string();
    (rma, id_of(&body["data"]["items"][0]["id"]))
}

async fn step(s: &Shipped, rma: &str, action: &str, body: Value) -> Value {
    let (status, body) = s
        .app
        .post(&format!("/api/v1/returns/{}/{}", rma, action), body)
        .await;
    assert_eq!(status, StatusCode::OK, "{action}: {body}");
    body["data"].clone()
}

/// Approve, receive three and inspect two restockable and one disposed
/// with a $15.00 fee.
async fn inspected_return(s: &Shipped) -> String {
    let (rma, item_id) = open_return(s, 3).await;
    step(s, &rma, "approve", json!({})).await;
    step(
        s,
        &rma,
        "receive",
        json!({ "items": [{ "itemId": item_id, "quantityReceived": 3 }] }),
    )
    .await;
    let inspected = step(
        s,
        &rma,
        "inspect",
        json!({
            "items": [{
                "itemId": item_id,
                "condition": "GOOD",
                "quantityRestockable": 2,
                "quantityDisposed": 1,
            }],
            "restockingFee": "15.00",
        }),
    )
    .await;
    assert_eq!(inspected["return_order"]["status"], "INSPECTION_COMPLETE");
    assert_eq!(inspected["return_order"]["refund_status"], "PENDING");
    rma
}

async fn load_return(s: &Shipped, rma: &str) -> return_order::Model {
    return_order::Entity::find()
        .filter(return_order::Column::RmaNumber.eq(rma))
        .one(&*s.app.state.db)
        .await
        .expect("return query")
        .expect("return exists")
}

#[tokio::test]
async fn refund_is_line_value_minus_restocking_fee_and_restocks_once() {
    let s = shipped_order().await;
    let rma = inspected_return(&s).await;

    let preview = load_return(&s, &rma).await;
    assert_eq!(preview.refund_amount, Some(dec!(135)));

    let refunded = step(&s, &rma, "process-refund", json!({})).await;
    assert_eq!(refunded["status"], "REFUNDED");
    assert_eq!(refunded["refund_status"], "COMPLETED");

    let ret = load_return(&s, &rma).await;
    assert_eq!(ret.status, ReturnStatus::Refunded);
    assert_eq!(ret.refund_status, RefundStatus::Completed);
    assert_eq!(ret.refund_amount, Some(dec!(135)));
    assert!(ret.restocked_at.is_some());

    let row = s.app.inventory_row(s.variant_id, s.restock_location_id).await;
    assert_eq!(row.quantity_on_hand, 2);
    let ledger = inventory_transaction::Entity::find()
        .filter(inventory_transaction::Column::VariantId.eq(s.variant_id))
        .filter(inventory_transaction::Column::TransactionType.eq(TransactionType::Returns))
        .all(&*s.app.state.db)
        .await
        .expect("ledger query");
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].quantity_change, 2);

    let (status, body) = s
        .app
        .post(&format!("/api/v1/returns/{}/restock", rma), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap_or_default().contains("already been restocked"));
    assert_eq!(
        s.app
            .inventory_row(s.variant_id, s.restock_location_id)
            .await
            .quantity_on_hand,
        2
    );
}

#[tokio::test]
async fn refund_without_an_active_restock_location_rolls_back() {
    let s = shipped_order().await;
    let rma = inspected_return(&s).await;

    let storage = location::Entity::find_by_id(s.restock_location_id)
        .one(&*s.app.state.db)
        .await
        .expect("location query")
        .expect("location exists");
    let mut active = storage.into_active_model();
    active.is_active = Set(false);
    active.update(&*s.app.state.db).await.expect("deactivate location");

    let (status, body) = s
        .app
        .post(&format!("/api/v1/returns/{}/process-refund", rma), json!({}))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap_or_default()
        .contains("No active STORAGE location"));

    let ret = load_return(&s, &rma).await;
    assert_eq!(ret.status, ReturnStatus::InspectionComplete);
    assert_eq!(ret.refund_status, RefundStatus::Pending);
    assert!(ret.restocked_at.is_none());

    let ledger = inventory_transaction::Entity::find()
        .filter(inventory_transaction::Column::VariantId.eq(s.variant_id))
        .filter(inventory_transaction::Column::TransactionType.eq(TransactionType::Returns))
        .all(&*s.app.state.db)
        .await
        .expect("ledger query");
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn explicit_restock_before_refund_is_not_repeated() {
    let s = shipped_order().await;
    let rma = inspected_return(&s).await;

    let restocked = step(&s, &rma, "restock", json!({})).await;
    assert_eq!(restocked["units_restocked"], 2);
    assert_eq!(restocked["location_id"], json!(s.restock_location_id));

    step(&s, &rma, "process-refund", json!({})).await;

    let row = s.app.inventory_row(s.variant_id, s.restock_location_id).await;
    assert_eq!(row.quantity_on_hand, 2);
}

#[tokio::test]
async fn returns_are_limited_to_ordered_quantity() {
    let s = shipped_order().await;
    open_return(&s, 2).await;

    let (status, body) = s
        .app
        .post(
            "/api/v1/returns",
            json!({
                "orderId": s.order_id,
                "reason": "Second thoughts",
                "items": [{ "orderItemId": s.order_item_id, "quantity": 2 }],
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap_or_default().contains("already requested"));
}

#[tokio::test]
async fn unshipped_orders_cannot_be_returned() {
    let app = TestApp::new().await;
    let variant = app.seed_variant("BOOT", dec!(50.00)).await;
    let detail = app.seed_order(&[(variant.id, 1)]).await;

    let (status, _) = app
        .post(
            "/api/v1/returns",
            json!({
                "orderId": detail.order.id,
                "reason": "Never arrived",
                "items": [{ "orderItemId": detail.items[0].id, "quantity": 1 }],
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let order = order::Entity::find_by_id(detail.order.id)
        .one(&*app.state.db)
        .await
        .expect("order query")
        .expect("order exists");
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn refund_before_inspection_is_rejected() {
    let s = shipped_order().await;
    let (rma, _) = open_return(&s, 1).await;
    step(&s, &rma, "approve", json!({})).await;

    let (status, _) = s
        .app
        .post(&format!("/api/v1/returns/{}/process-refund", rma), json!({}))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(load_return(&s, &rma).await.refund_status, RefundStatus::NotRequested);
}

#[tokio::test]
async fn rejected_returns_record_the_reason() {
    let s = shipped_order().await;
    let (rma, _) = open_return(&s, 1).await;

    let rejected = step(&s, &rma, "reject", json!({ "reason": "Outside return window" })).await;

    assert_eq!(rejected["status"], "REJECTED");
    assert_eq!(rejected["rejection_reason"], "Outside return window");
}

#[tokio::test]
async fn staff_cannot_approve_returns() {
    let s = shipped_order().await;
    let (rma, _) = open_return(&s, 1).await;
    let token = s.app.staff_token().to_string();

    let (status, _) = s
        .app
        .call_as(
            &token,
            Method::POST,
            &format!("/api/v1/returns/{}/approve", rma),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(load_return(&s, &rma).await.status, ReturnStatus::Pending);
}

#[tokio::test]
async fn unknown_rma_is_not_found() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/api/v1/returns/RMA-DOES-NOT-EXIST").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

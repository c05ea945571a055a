mod common;

use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use common::{id_of, TestApp};
use warehouse_api::models::location::LocationType;
use warehouse_api::notifications::NotificationType;

struct TwoBins {
    app: TestApp,
    variant_id: Uuid,
    from: Uuid,
    to: Uuid,
}

async fn two_bins(stock: i32) -> TwoBins {
    let app = TestApp::new().await;
    let from = app.seed_location("A-01", LocationType::Storage).await;
    let to = app.seed_location("P-01", LocationType::Picking).await;
    let variant = app.seed_variant("BOLT", Decimal::new(150, 2)).await;
    app.receive(variant.id, from.id, stock).await;
    TwoBins {
        app,
        variant_id: variant.id,
        from: from.id,
        to: to.id,
    }
}

/// Requested by the staff user.
async fn request_transfer(bins: &TwoBins, quantity: i32) -> (StatusCode, serde_json::Value) {
    let token = bins.app.staff_token().to_string();
    bins.app
        .call_as(
            &token,
            Method::POST,
            "/api/v1/inventory/transfers",
            Some(json!({
                "variantId": bins.variant_id,
                "fromLocationId": bins.from,
                "toLocationId": bins.to,
                "quantity": quantity,
                "reason": "Replenish pick face",
            })),
        )
        .await
}

#[tokio::test]
async fn approved_transfer_moves_stock_and_tells_the_requester() {
    let bins = two_bins(10).await;
    let (status, body) = request_transfer(&bins, 4).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "PENDING");
    let transfer_id = id_of(&body["data"]["id"]);

    // Nothing moves until a manager approves.
    assert_eq!(bins.app.inventory_row(bins.variant_id, bins.from).await.quantity_on_hand, 10);

    let (_, pending) = bins.app.get("/api/v1/inventory/transfers/pending").await;
    assert_eq!(pending["data"].as_array().map(Vec::len), Some(1));

    let (status, body) = bins
        .app
        .post(
            &format!("/api/v1/inventory/transfers/pending/{}/approve", transfer_id),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "COMPLETED");
    assert_eq!(body["data"]["reviewed_by"], json!(bins.app.manager_id));

    assert_eq!(bins.app.inventory_row(bins.variant_id, bins.from).await.quantity_on_hand, 6);
    assert_eq!(bins.app.inventory_row(bins.variant_id, bins.to).await.quantity_on_hand, 4);

    let (_, ledger) = bins
        .app
        .get(&format!(
            "/api/v1/inventory/transactions?variant_id={}",
            bins.variant_id
        ))
        .await;
    let mut moves: Vec<i64> = ledger["data"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .filter(|row| row["transaction_type"] == "TRANSFER")
                .filter_map(|row| row["quantity_change"].as_i64())
                .collect()
        })
        .unwrap_or_default();
    moves.sort_unstable();
    assert_eq!(moves, [-4, 4]);

    let sent = bins.app.notifications.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id, bins.app.staff_id);
    assert_eq!(sent[0].notification_type, NotificationType::TransferDecision);

    let (_, pending) = bins.app.get("/api/v1/inventory/transfers/pending").await;
    assert_eq!(pending["data"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn rejected_transfer_leaves_stock_alone() {
    let bins = two_bins(10).await;
    let (_, body) = request_transfer(&bins, 4).await;
    let transfer_id = id_of(&body["data"]["id"]);

    let (status, body) = bins
        .app
        .post(
            &format!("/api/v1/inventory/transfers/pending/{}/reject", transfer_id),
            json!({ "reason": "Pick face is being relabelled" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "REJECTED");
    assert_eq!(body["data"]["rejection_reason"], "Pick face is being relabelled");
    assert_eq!(bins.app.inventory_row(bins.variant_id, bins.from).await.quantity_on_hand, 10);

    let sent = bins.app.notifications.sent().await;
    assert!(sent[0].message.contains("relabelled"));
}

#[tokio::test]
async fn rejection_needs_a_reason() {
    let bins = two_bins(10).await;
    let (_, body) = request_transfer(&bins, 4).await;
    let transfer_id = id_of(&body["data"]["id"]);

    let (status, _) = bins
        .app
        .post(
            &format!("/api/v1/inventory/transfers/pending/{}/reject", transfer_id),
            json!({ "reason": "   " }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn transfers_cannot_exceed_available_stock() {
    let bins = two_bins(3).await;

    let (status, body) = request_transfer(&bins, 4).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap_or_default().contains("Only 3 units"));
}

#[tokio::test]
async fn approval_rechecks_availability() {
    let bins = two_bins(5).await;
    let (_, body) = request_transfer(&bins, 4).await;
    let transfer_id = id_of(&body["data"]["id"]);

    // Stock gets reserved by an order between request and approval.
    let order = bins.app.seed_order(&[(bins.variant_id, 3)]).await;
    bins.app
        .post(
            "/api/v1/orders/actions",
            json!({ "action": "ALLOCATE", "orderId": order.order.id }),
        )
        .await;

    let (status, _) = bins
        .app
        .post(
            &format!("/api/v1/inventory/transfers/pending/{}/approve", transfer_id),
            json!({}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let row = bins.app.inventory_row(bins.variant_id, bins.from).await;
    assert_eq!(row.quantity_on_hand, 5);
    assert_eq!(row.quantity_reserved, 3);
}

#[tokio::test]
async fn same_source_and_destination_is_invalid() {
    let bins = two_bins(5).await;
    let (status, _) = bins
        .app
        .post(
            "/api/v1/inventory/transfers",
            json!({
                "variantId": bins.variant_id,
                "fromLocationId": bins.from,
                "toLocationId": bins.from,
                "quantity": 1,
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn staff_cannot_approve_transfers() {
    let bins = two_bins(10).await;
    let (_, body) = request_transfer(&bins, 4).await;
    let transfer_id = id_of(&body["data"]["id"]);
    let token = bins.app.staff_token().to_string();

    let (status, _) = bins
        .app
        .call_as(
            &token,
            Method::POST,
            &format!("/api/v1/inventory/transfers/pending/{}/approve", transfer_id),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(bins.app.inventory_row(bins.variant_id, bins.from).await.quantity_on_hand, 10);
}

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ErrorResponse,
    handlers::common::ValidatedJson,
    models::order_status_history,
    services::orders::{CreateOrderRequest, OrderActionOutcome, OrderActionRequest, OrderDetail},
    ApiResponse, ApiResult, AppState,
};

/// Create a new order
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    tag = "Orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Order created"),
        (status = 400, description = "Invalid request data", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateOrderRequest>,
) -> ApiResult<OrderDetail> {
    let order = state
        .services
        .orders
        .create_order(payload, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Get order by ID, with its lines, allocations and backorders
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    tag = "Orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved"),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderDetail> {
    Ok(Json(ApiResponse::success(
        state.services.orders.get_order(id).await?,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/history",
    tag = "Orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Status history, oldest first"),
        (status = 404, description = "Order not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn order_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<order_status_history::Model>> {
    Ok(Json(ApiResponse::success(
        state.services.orders.order_history(id).await?,
    )))
}

/// Run an order action: allocation in any mode, fulfilment or pick generation,
/// singly or in bulk.
#[utoipa::path(
    post,
    path = "/api/v1/orders/actions",
    tag = "Orders",
    request_body = OrderActionRequest,
    responses(
        (status = 200, description = "Action applied; bulk actions report per-order results"),
        (status = 400, description = "Invalid action, status or stock", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn order_action(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<OrderActionRequest>,
) -> ApiResult<OrderActionOutcome> {
    let outcome = state
        .services
        .orders
        .execute_action(payload, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

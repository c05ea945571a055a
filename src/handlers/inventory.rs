use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ErrorResponse,
    handlers::common::ValidatedJson,
    models::inventory_transaction,
    services::inventory::{InventoryQuery, InventoryView, ReceiveStockRequest},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransactionQuery {
    /// Restrict the ledger to one variant
    pub variant_id: Option<Uuid>,
}

/// List stock rows with their available quantity
#[utoipa::path(
    get,
    path = "/api/v1/inventory",
    tag = "Inventory",
    params(InventoryQuery),
    responses(
        (status = 200, description = "Inventory rows"),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_inventory(
    State(state): State<AppState>,
    Query(query): Query<InventoryQuery>,
) -> ApiResult<Vec<InventoryView>> {
    Ok(Json(ApiResponse::success(
        state.services.inventory.list(query).await?,
    )))
}

/// Receive stock into a location
#[utoipa::path(
    post,
    path = "/api/v1/inventory/receive",
    tag = "Inventory",
    request_body = ReceiveStockRequest,
    responses(
        (status = 200, description = "Stock received"),
        (status = 400, description = "Invalid quantity or inactive location", body = ErrorResponse),
        (status = 404, description = "Variant or location not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn receive_stock(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<ReceiveStockRequest>,
) -> ApiResult<InventoryView> {
    let row = state
        .services
        .inventory
        .receive(payload, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(row)))
}

/// Inventory ledger, newest first
#[utoipa::path(
    get,
    path = "/api/v1/inventory/transactions",
    tag = "Inventory",
    params(TransactionQuery),
    responses((status = 200, description = "Ledger entries")),
    security(("Bearer" = []))
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> ApiResult<Vec<inventory_transaction::Model>> {
    Ok(Json(ApiResponse::success(
        state
            .services
            .inventory
            .transactions(query.variant_id)
            .await?,
    )))
}

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ErrorResponse,
    handlers::common::ValidatedJson,
    models::inventory_transfer,
    services::transfers::{CreateTransferRequest, RejectTransferRequest},
    ApiResponse, ApiResult, AppState,
};

/// Request a stock transfer between two locations
#[utoipa::path(
    post,
    path = "/api/v1/inventory/transfers",
    tag = "Transfers",
    request_body = CreateTransferRequest,
    responses(
        (status = 200, description = "Transfer pending approval"),
        (status = 400, description = "Same location or insufficient stock", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_transfer(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateTransferRequest>,
) -> ApiResult<inventory_transfer::Model> {
    let transfer = state
        .services
        .transfers
        .create_transfer(payload, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(transfer)))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/transfers/pending",
    tag = "Transfers",
    responses((status = 200, description = "Transfers awaiting review, oldest first")),
    security(("Bearer" = []))
)]
pub async fn list_pending_transfers(
    State(state): State<AppState>,
) -> ApiResult<Vec<inventory_transfer::Model>> {
    Ok(Json(ApiResponse::success(
        state.services.transfers.list_pending().await?,
    )))
}

/// Approve a pending transfer and move the stock
#[utoipa::path(
    post,
    path = "/api/v1/inventory/transfers/pending/{id}/approve",
    tag = "Transfers",
    params(("id" = Uuid, Path, description = "Transfer ID")),
    responses(
        (status = 200, description = "Transfer completed"),
        (status = 400, description = "Not pending or source short", body = ErrorResponse),
        (status = 403, description = "Manager role required", body = ErrorResponse),
        (status = 404, description = "Transfer not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn approve_transfer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<inventory_transfer::Model> {
    let transfer = state
        .services
        .transfers
        .approve_transfer(id, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(transfer)))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/transfers/pending/{id}/reject",
    tag = "Transfers",
    params(("id" = Uuid, Path, description = "Transfer ID")),
    request_body = RejectTransferRequest,
    responses(
        (status = 200, description = "Transfer rejected"),
        (status = 400, description = "Missing reason or not pending", body = ErrorResponse),
        (status = 403, description = "Manager role required", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn reject_transfer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<RejectTransferRequest>,
) -> ApiResult<inventory_transfer::Model> {
    let transfer = state
        .services
        .transfers
        .reject_transfer(id, payload, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(transfer)))
}

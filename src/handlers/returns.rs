use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    auth::AuthUser,
    errors::ErrorResponse,
    handlers::common::ValidatedJson,
    models::return_order,
    services::returns::{
        CreateReturnRequest, InspectReturnRequest, ReceiveReturnRequest, RejectReturnRequest,
        RestockOutcome, ReturnDetail,
    },
    ApiResponse, ApiResult, AppState,
};

/// Open a return (RMA) against a shipped order
#[utoipa::path(
    post,
    path = "/api/v1/returns",
    tag = "Returns",
    request_body = CreateReturnRequest,
    responses(
        (status = 200, description = "Return requested"),
        (status = 400, description = "Order not shipped or quantities exceed order", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_return(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateReturnRequest>,
) -> ApiResult<ReturnDetail> {
    let ret = state
        .services
        .returns
        .create_return(payload, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(ret)))
}

#[utoipa::path(
    get,
    path = "/api/v1/returns/{rma}",
    tag = "Returns",
    params(("rma" = String, Path, description = "RMA number")),
    responses(
        (status = 200, description = "Return with items and events"),
        (status = 404, description = "Return not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_return(
    State(state): State<AppState>,
    Path(rma): Path<String>,
) -> ApiResult<ReturnDetail> {
    Ok(Json(ApiResponse::success(
        state.services.returns.get_return(&rma).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/returns/{rma}/approve",
    tag = "Returns",
    params(("rma" = String, Path, description = "RMA number")),
    responses(
        (status = 200, description = "Return approved"),
        (status = 400, description = "Return is not awaiting approval", body = ErrorResponse),
        (status = 403, description = "Manager role required", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn approve_return(
    State(state): State<AppState>,
    user: AuthUser,
    Path(rma): Path<String>,
) -> ApiResult<return_order::Model> {
    let ret = state
        .services
        .returns
        .approve_return(rma, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(ret)))
}

#[utoipa::path(
    post,
    path = "/api/v1/returns/{rma}/reject",
    tag = "Returns",
    params(("rma" = String, Path, description = "RMA number")),
    request_body = RejectReturnRequest,
    responses(
        (status = 200, description = "Return rejected"),
        (status = 400, description = "Missing reason or wrong status", body = ErrorResponse),
        (status = 403, description = "Manager role required", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn reject_return(
    State(state): State<AppState>,
    user: AuthUser,
    Path(rma): Path<String>,
    ValidatedJson(payload): ValidatedJson<RejectReturnRequest>,
) -> ApiResult<return_order::Model> {
    let ret = state
        .services
        .returns
        .reject_return(rma, payload, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(ret)))
}

/// Record the quantities that arrived at the dock
#[utoipa::path(
    post,
    path = "/api/v1/returns/{rma}/receive",
    tag = "Returns",
    params(("rma" = String, Path, description = "RMA number")),
    request_body = ReceiveReturnRequest,
    responses(
        (status = 200, description = "Return received"),
        (status = 400, description = "Not approved or more than requested", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn receive_return(
    State(state): State<AppState>,
    user: AuthUser,
    Path(rma): Path<String>,
    ValidatedJson(payload): ValidatedJson<ReceiveReturnRequest>,
) -> ApiResult<ReturnDetail> {
    let ret = state
        .services
        .returns
        .receive_return(rma, payload, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(ret)))
}

/// Grade received items and compute the refund
#[utoipa::path(
    post,
    path = "/api/v1/returns/{rma}/inspect",
    tag = "Returns",
    params(("rma" = String, Path, description = "RMA number")),
    request_body = InspectReturnRequest,
    responses(
        (status = 200, description = "Inspection recorded, refund amount set"),
        (status = 400, description = "Not received or quantities exceed received", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn inspect_return(
    State(state): State<AppState>,
    user: AuthUser,
    Path(rma): Path<String>,
    ValidatedJson(payload): ValidatedJson<InspectReturnRequest>,
) -> ApiResult<ReturnDetail> {
    let ret = state
        .services
        .returns
        .inspect_return(rma, payload, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(ret)))
}

#[utoipa::path(
    post,
    path = "/api/v1/returns/{rma}/restock",
    tag = "Returns",
    params(("rma" = String, Path, description = "RMA number")),
    responses(
        (status = 200, description = "Restockable units added to the returns location"),
        (status = 400, description = "Not inspected or already restocked", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn restock_return(
    State(state): State<AppState>,
    user: AuthUser,
    Path(rma): Path<String>,
) -> ApiResult<RestockOutcome> {
    let outcome = state
        .services
        .returns
        .restock_return(rma, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// Issue the refund, restocking first if that has not happened yet
#[utoipa::path(
    post,
    path = "/api/v1/returns/{rma}/process-refund",
    tag = "Returns",
    params(("rma" = String, Path, description = "RMA number")),
    responses(
        (status = 200, description = "Refund completed"),
        (status = 400, description = "Inspection incomplete or already refunded", body = ErrorResponse),
        (status = 403, description = "Manager role required", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn process_refund(
    State(state): State<AppState>,
    user: AuthUser,
    Path(rma): Path<String>,
) -> ApiResult<return_order::Model> {
    let ret = state
        .services
        .returns
        .process_refund(rma, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(ret)))
}

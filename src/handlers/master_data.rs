use axum::{extract::State, Json};

use crate::{
    auth::AuthUser,
    errors::ErrorResponse,
    handlers::common::ValidatedJson,
    models::{location, product_variant},
    services::master_data::{CreateLocationRequest, CreateVariantRequest},
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    post,
    path = "/api/v1/locations",
    tag = "Master Data",
    request_body = CreateLocationRequest,
    responses(
        (status = 200, description = "Location created"),
        (status = 400, description = "Duplicate code or invalid data", body = ErrorResponse),
        (status = 403, description = "Manager role required", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_location(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateLocationRequest>,
) -> ApiResult<location::Model> {
    let location = state
        .services
        .catalog
        .create_location(payload, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(location)))
}

#[utoipa::path(
    post,
    path = "/api/v1/variants",
    tag = "Master Data",
    request_body = CreateVariantRequest,
    responses(
        (status = 200, description = "Variant created"),
        (status = 400, description = "Duplicate SKU or invalid data", body = ErrorResponse),
        (status = 403, description = "Manager role required", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_variant(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateVariantRequest>,
) -> ApiResult<product_variant::Model> {
    let variant = state
        .services
        .catalog
        .create_variant(payload, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(variant)))
}

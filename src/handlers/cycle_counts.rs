use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ErrorResponse,
    handlers::common::ValidatedJson,
    models::{cycle_count_campaign, cycle_count_task},
    services::cycle_counts::{
        CampaignDetail, CreateCycleCountRequest, RecordCountOutcome, RecordCountRequest,
        RecountRequest,
    },
    ApiResponse, ApiResult, AppState,
};

/// Open a cycle count campaign over a set of locations
#[utoipa::path(
    post,
    path = "/api/v1/inventory/cycle-counts",
    tag = "Cycle Counts",
    request_body = CreateCycleCountRequest,
    responses(
        (status = 200, description = "Campaign created with one task per stock row"),
        (status = 400, description = "No matching stock rows or bad tolerance", body = ErrorResponse),
        (status = 403, description = "Manager role required", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_cycle_count(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateCycleCountRequest>,
) -> ApiResult<CampaignDetail> {
    let campaign = state
        .services
        .cycle_counts
        .create_campaign(payload, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(campaign)))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/cycle-counts/{id}",
    tag = "Cycle Counts",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Campaign with its tasks"),
        (status = 404, description = "Campaign not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_cycle_count(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<CampaignDetail> {
    Ok(Json(ApiResponse::success(
        state.services.cycle_counts.get_campaign(id).await?,
    )))
}

/// Record a count (or skip) for one task of the campaign
#[utoipa::path(
    post,
    path = "/api/v1/inventory/cycle-counts/{id}/count",
    tag = "Cycle Counts",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    request_body = RecordCountRequest,
    responses(
        (status = 200, description = "Count recorded; campaign counters recomputed"),
        (status = 400, description = "Invalid quantity, status or task state", body = ErrorResponse),
        (status = 404, description = "Campaign or task not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn record_count(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<RecordCountRequest>,
) -> ApiResult<RecordCountOutcome> {
    let outcome = state
        .services
        .cycle_counts
        .record_count(id, payload, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/cycle-counts/{id}/complete",
    tag = "Cycle Counts",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Campaign completed"),
        (status = 400, description = "Already completed or tasks still open", body = ErrorResponse),
        (status = 403, description = "Manager role required", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn complete_cycle_count(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<cycle_count_campaign::Model> {
    let campaign = state
        .services
        .cycle_counts
        .complete_campaign(id, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(campaign)))
}

/// Send a task back for a recount by another counter
#[utoipa::path(
    post,
    path = "/api/v1/inventory/cycle-counts/{id}/tasks/{task_id}/recount",
    tag = "Cycle Counts",
    params(
        ("id" = Uuid, Path, description = "Campaign ID"),
        ("task_id" = Uuid, Path, description = "Task ID"),
    ),
    request_body = RecountRequest,
    responses(
        (status = 200, description = "Task reassigned for recount"),
        (status = 400, description = "Task is not awaiting review", body = ErrorResponse),
        (status = 403, description = "Manager role required", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn escalate_recount(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, task_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(payload): ValidatedJson<RecountRequest>,
) -> ApiResult<cycle_count_task::Model> {
    let task = state
        .services
        .cycle_counts
        .escalate_recount(id, task_id, payload, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(task)))
}

/// Accept an out-of-tolerance count and post the adjustment
#[utoipa::path(
    post,
    path = "/api/v1/inventory/cycle-counts/{id}/tasks/{task_id}/approve-variance",
    tag = "Cycle Counts",
    params(
        ("id" = Uuid, Path, description = "Campaign ID"),
        ("task_id" = Uuid, Path, description = "Task ID"),
    ),
    responses(
        (status = 200, description = "Variance applied to inventory"),
        (status = 400, description = "Task is not awaiting review", body = ErrorResponse),
        (status = 403, description = "Manager role required", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn approve_variance(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, task_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<RecordCountOutcome> {
    let outcome = state
        .services
        .cycle_counts
        .approve_variance(id, task_id, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ErrorResponse,
    handlers::common::ValidatedJson,
    models::{pick_list, work_task, work_task::TaskType},
    services::picking::{
        AssignRequest, CompleteTaskItemRequest, CreateTaskRequest, PickItemRequest,
        PickListDetail, PickOutcome, TaskDetail, TaskItemOutcome,
    },
    ApiResponse, ApiResult, AppState,
};

// Pick lists

#[utoipa::path(
    get,
    path = "/api/v1/pick-lists/{id}",
    tag = "Picking",
    params(("id" = Uuid, Path, description = "Pick list ID")),
    responses(
        (status = 200, description = "Pick list with items in walk order"),
        (status = 404, description = "Pick list not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_pick_list(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<PickListDetail> {
    Ok(Json(ApiResponse::success(
        state.services.picking.get_pick_list(id).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/pick-lists/{id}/assign",
    tag = "Picking",
    params(("id" = Uuid, Path, description = "Pick list ID")),
    request_body = AssignRequest,
    responses(
        (status = 200, description = "Pick list assigned"),
        (status = 403, description = "Manager role required", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn assign_pick_list(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<AssignRequest>,
) -> ApiResult<pick_list::Model> {
    let pick_list = state
        .services
        .picking
        .assign_pick_list(id, payload.user_id, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(pick_list)))
}

/// Confirm a pick with a scanned location or product code
#[utoipa::path(
    post,
    path = "/api/v1/pick-lists/{id}/items/{item_id}/pick",
    tag = "Picking",
    params(
        ("id" = Uuid, Path, description = "Pick list ID"),
        ("item_id" = Uuid, Path, description = "Pick list item ID"),
    ),
    request_body = PickItemRequest,
    responses(
        (status = 200, description = "Item picked; list counters recomputed"),
        (status = 400, description = "Scan mismatch, over-pick or closed list", body = ErrorResponse),
        (status = 404, description = "Pick list or item not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn pick_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(payload): ValidatedJson<PickItemRequest>,
) -> ApiResult<PickOutcome> {
    let outcome = state
        .services
        .picking
        .pick_item(id, item_id, payload, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

// Work tasks

/// Create a packing task for picked orders
#[utoipa::path(
    post,
    path = "/api/v1/tasks/packing",
    tag = "Picking",
    request_body = CreateTaskRequest,
    responses(
        (status = 200, description = "Packing task created"),
        (status = 400, description = "Orders not picked or already in packing", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_packing_task(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateTaskRequest>,
) -> ApiResult<TaskDetail> {
    create_task(state, user, TaskType::Packing, payload).await
}

/// Create a picking task for allocated orders
#[utoipa::path(
    post,
    path = "/api/v1/tasks/picking",
    tag = "Picking",
    request_body = CreateTaskRequest,
    responses(
        (status = 200, description = "Picking task created"),
        (status = 400, description = "Orders not allocated", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_picking_task(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateTaskRequest>,
) -> ApiResult<TaskDetail> {
    create_task(state, user, TaskType::Picking, payload).await
}

async fn create_task(
    state: AppState,
    user: AuthUser,
    task_type: TaskType,
    payload: CreateTaskRequest,
) -> ApiResult<TaskDetail> {
    let task = state
        .services
        .picking
        .create_task(task_type, payload.order_ids, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(task)))
}

#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}",
    tag = "Picking",
    params(("id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task with its items"),
        (status = 404, description = "Task not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<TaskDetail> {
    Ok(Json(ApiResponse::success(
        state.services.picking.get_task(id).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/tasks/{id}/assign",
    tag = "Picking",
    params(("id" = Uuid, Path, description = "Task ID")),
    request_body = AssignRequest,
    responses(
        (status = 200, description = "Task assigned"),
        (status = 403, description = "Manager role required", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn assign_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<AssignRequest>,
) -> ApiResult<work_task::Model> {
    let task = state
        .services
        .picking
        .assign_task(id, payload.user_id, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(task)))
}

#[utoipa::path(
    post,
    path = "/api/v1/tasks/{id}/items/{item_id}/complete",
    tag = "Picking",
    params(
        ("id" = Uuid, Path, description = "Task ID"),
        ("item_id" = Uuid, Path, description = "Task item ID"),
    ),
    request_body = CompleteTaskItemRequest,
    responses(
        (status = 200, description = "Item completed; task counters recomputed"),
        (status = 400, description = "Scan mismatch or closed task", body = ErrorResponse),
        (status = 404, description = "Task or item not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn complete_task_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(payload): ValidatedJson<CompleteTaskItemRequest>,
) -> ApiResult<TaskItemOutcome> {
    let outcome = state
        .services
        .picking
        .complete_task_item(id, item_id, payload, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

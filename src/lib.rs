//! Warehouse API library
//!
//! Order allocation, cycle counting, pick/pack, transfers and returns over a
//! sea-orm store, exposed as an axum router.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod events;
pub mod fulfillment;
pub mod handlers;
pub mod metrics;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod tracing;

use std::{sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::HeaderValue,
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use utoipa::ToSchema;

use crate::auth::{AuthRouterExt, AuthService, Role};
use crate::fulfillment::FulfillmentPlatform;
use crate::notifications::NotificationService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
        notifications: Arc<dyn NotificationService>,
        fulfillment: Arc<dyn FulfillmentPlatform>,
    ) -> Self {
        let settings = handlers::WorkflowSettings {
            count_tolerance: config.count_tolerance(),
            restock_location_type: config.restock_location(),
        };
        let services = handlers::AppServices::new(
            db.clone(),
            event_sender.clone(),
            notifications,
            fulfillment,
            settings,
        );
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn success_response_outside_a_request_has_no_request_id() {
        let response = ApiResponse::success(1);
        let meta = response.meta.expect("metadata expected");
        assert!(meta.request_id.is_none());
        assert!(response.success);
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Every `/api/v1` route. Workflow routes need a bearer token; approval and
/// assignment routes additionally need the MANAGER role.
pub fn api_v1_routes() -> Router<AppState> {
    use handlers::{cycle_counts, inventory, master_data, orders, picking, returns, transfers};

    let any_role = Router::new()
        // Orders
        .route("/orders", post(orders::create_order))
        .route("/orders/actions", post(orders::order_action))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/history", get(orders::order_history))
        // Inventory
        .route("/inventory", get(inventory::list_inventory))
        .route("/inventory/receive", post(inventory::receive_stock))
        .route("/inventory/transactions", get(inventory::list_transactions))
        .route(
            "/inventory/cycle-counts/:id",
            get(cycle_counts::get_cycle_count),
        )
        .route(
            "/inventory/cycle-counts/:id/count",
            post(cycle_counts::record_count),
        )
        .route("/inventory/transfers", post(transfers::create_transfer))
        .route(
            "/inventory/transfers/pending",
            get(transfers::list_pending_transfers),
        )
        // Returns
        .route("/returns", post(returns::create_return))
        .route("/returns/:rma", get(returns::get_return))
        .route("/returns/:rma/receive", post(returns::receive_return))
        .route("/returns/:rma/inspect", post(returns::inspect_return))
        .route("/returns/:rma/restock", post(returns::restock_return))
        // Pick and pack
        .route("/pick-lists/:id", get(picking::get_pick_list))
        .route(
            "/pick-lists/:id/items/:item_id/pick",
            post(picking::pick_item),
        )
        .route("/tasks/packing", post(picking::create_packing_task))
        .route("/tasks/picking", post(picking::create_picking_task))
        .route("/tasks/:id", get(picking::get_task))
        .route(
            "/tasks/:id/items/:item_id/complete",
            post(picking::complete_task_item),
        )
        .with_auth();

    let manager = Router::new()
        .route(
            "/inventory/cycle-counts",
            post(cycle_counts::create_cycle_count),
        )
        .route(
            "/inventory/cycle-counts/:id/complete",
            post(cycle_counts::complete_cycle_count),
        )
        .route(
            "/inventory/cycle-counts/:id/tasks/:task_id/recount",
            post(cycle_counts::escalate_recount),
        )
        .route(
            "/inventory/cycle-counts/:id/tasks/:task_id/approve-variance",
            post(cycle_counts::approve_variance),
        )
        .route(
            "/inventory/transfers/pending/:id/approve",
            post(transfers::approve_transfer),
        )
        .route(
            "/inventory/transfers/pending/:id/reject",
            post(transfers::reject_transfer),
        )
        .route("/returns/:rma/approve", post(returns::approve_return))
        .route("/returns/:rma/reject", post(returns::reject_return))
        .route(
            "/returns/:rma/process-refund",
            post(returns::process_refund),
        )
        .route("/pick-lists/:id/assign", post(picking::assign_pick_list))
        .route("/tasks/:id/assign", post(picking::assign_task))
        .route("/locations", post(master_data::create_location))
        .route("/variants", post(master_data::create_variant))
        .with_role(Role::Manager);

    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(any_role)
        .merge(manager)
}

/// Full application router: `/api/v1`, `/metrics`, Swagger UI and the
/// request-id, CORS, compression, timeout and tracing layers.
pub fn build_router(state: AppState, auth_service: Arc<AuthService>) -> Router {
    let cors = cors_layer(&state.config);
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        .route("/metrics", get(metrics::metrics_handler))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .fallback(route_not_found)
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(TimeoutLayer::new(timeout))
        .layer(CompressionLayer::new())
        .layer(cors)
        // Auth middleware looks the validator up in request extensions
        .layer(Extension(auth_service))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!("using permissive CORS; no explicit origins configured");
        CorsLayer::permissive()
    } else {
        ::tracing::warn!("no CORS origins configured; cross-origin requests will be refused");
        CorsLayer::new()
    }
}

async fn route_not_found() -> errors::ServiceError {
    errors::ServiceError::NotFound("Route not found".to_string())
}

async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "warehouse-api",
        "environment": state.config.environment,
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let db_status = match db::check_connection(&state.db).await {
        Ok(()) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}

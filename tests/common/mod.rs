#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use warehouse_api::{
    auth::{AuthConfig, AuthService, Role},
    build_router,
    config::AppConfig,
    db,
    events::{self, EventSender},
    fulfillment::{DisabledFulfillmentPlatform, FulfillmentPlatform, HttpFulfillmentPlatform},
    models::{inventory, location, location::LocationType, product_variant},
    notifications::InMemoryNotificationService,
    services::{
        inventory::ReceiveStockRequest,
        master_data::{CreateLocationRequest, CreateVariantRequest},
        orders::{CreateOrderItemRequest, CreateOrderRequest, OrderDetail},
    },
    AppState,
};

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// Application harness backed by a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub notifications: Arc<InMemoryNotificationService>,
    pub manager_id: Uuid,
    pub staff_id: Uuid,
    manager_token: String,
    staff_token: String,
    auth_service: Arc<AuthService>,
    _db_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Fresh application with fulfillment sync disabled.
    pub async fn new() -> Self {
        Self::with_fulfillment(Arc::new(DisabledFulfillmentPlatform)).await
    }

    /// Fresh application that pushes shipments to `base_url`.
    pub async fn with_fulfillment_url(base_url: &str) -> Self {
        let platform = HttpFulfillmentPlatform::new(base_url, None, Duration::from_secs(2))
            .expect("fulfillment client");
        Self::with_fulfillment(Arc::new(platform)).await
    }

    pub async fn with_fulfillment(fulfillment: Arc<dyn FulfillmentPlatform>) -> Self {
        let db_dir = tempfile::tempdir().expect("temp dir for test database");
        let db_path = db_dir.path().join("warehouse_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            TEST_JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.cors_allow_any_origin = true;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let notifications = Arc::new(InMemoryNotificationService::new());
        let state = AppState::new(
            db_arc,
            cfg.clone(),
            event_sender,
            notifications.clone(),
            fulfillment,
        );

        let auth_service = Arc::new(AuthService::new(AuthConfig::from(&cfg)));
        let manager_id = Uuid::new_v4();
        let staff_id = Uuid::new_v4();
        let manager_token = auth_service
            .issue_token(manager_id, Role::Manager)
            .expect("manager token");
        let staff_token = auth_service
            .issue_token(staff_id, Role::Staff)
            .expect("staff token");

        let router = build_router(state.clone(), auth_service.clone());

        Self {
            router,
            state,
            notifications,
            manager_id,
            staff_id,
            manager_token,
            staff_token,
            auth_service,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    pub fn auth_service(&self) -> Arc<AuthService> {
        self.auth_service.clone()
    }

    pub fn manager_token(&self) -> &str {
        &self.manager_token
    }

    pub fn staff_token(&self) -> &str {
        &self.staff_token
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Request as the manager, returning status and parsed body.
    pub async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let token = self.manager_token.clone();
        self.call_as(&token, method, uri, body).await
    }

    pub async fn call_as(
        &self,
        token: &str,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body, Some(token)).await;
        read_json(response).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(body)).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, None).await
    }

    pub async fn seed_location(&self, code: &str, location_type: LocationType) -> location::Model {
        self.state
            .services
            .catalog
            .create_location(
                CreateLocationRequest {
                    code: code.to_string(),
                    name: format!("Location {}", code),
                    location_type,
                    barcode: Some(format!("LOC-{}", code)),
                    is_active: None,
                },
                self.manager_id,
            )
            .await
            .expect("seed location")
    }

    /// Variant whose barcode is `BC-{sku}`.
    pub async fn seed_variant(&self, sku: &str, price: Decimal) -> product_variant::Model {
        self.state
            .services
            .catalog
            .create_variant(
                CreateVariantRequest {
                    sku: sku.to_string(),
                    upc: None,
                    barcode: Some(format!("BC-{}", sku)),
                    name: format!("Variant {}", sku),
                    price,
                },
                self.manager_id,
            )
            .await
            .expect("seed variant")
    }

    pub async fn receive(&self, variant_id: Uuid, location_id: Uuid, quantity: i32) {
        self.state
            .services
            .inventory
            .receive(
                ReceiveStockRequest {
                    variant_id,
                    location_id,
                    quantity,
                    notes: None,
                },
                self.manager_id,
            )
            .await
            .expect("seed stock");
    }

    pub async fn seed_order(&self, lines: &[(Uuid, i32)]) -> OrderDetail {
        self.state
            .services
            .orders
            .create_order(
                CreateOrderRequest {
                    order_number: None,
                    customer_name: "Test Customer".to_string(),
                    notes: None,
                    items: lines
                        .iter()
                        .map(|(variant_id, quantity)| CreateOrderItemRequest {
                            variant_id: *variant_id,
                            quantity: *quantity,
                            unit_price: None,
                        })
                        .collect(),
                },
                self.manager_id,
            )
            .await
            .expect("seed order")
    }

    pub async fn inventory_row(&self, variant_id: Uuid, location_id: Uuid) -> inventory::Model {
        inventory::Entity::find()
            .filter(inventory::Column::VariantId.eq(variant_id))
            .filter(inventory::Column::LocationId.eq(location_id))
            .one(&*self.state.db)
            .await
            .expect("inventory query")
            .expect("inventory row exists")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body is json")
    };
    (status, value)
}

pub fn id_of(value: &Value) -> Uuid {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .expect("uuid string")
}

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::unit_of_work;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::fulfillment::{FulfillmentLine, FulfillmentPlatform, FulfillmentUpdate};
use crate::metrics::FULFILLMENT_SYNC_FAILURES;
use crate::models::{
    backorder, inventory_allocation,
    order::{self, OrderStatus},
    order_item, order_status_history,
    pending_sync::{self, SyncStatus},
    product_variant, StatusTransition,
};
use crate::services::allocation::{AllocationMode, AllocationOutcome, AllocationService};
use crate::services::audit::{record_order_status, AuditEntry};
use crate::services::generate_number;
use crate::services::picking::{PickListDetail, PickingService};

pub const FULFILLMENT_SYNC_TARGET: &str = "fulfillment_platform";

/// Moves an order to `next`, writing the status history row and an audit
/// event in the same unit of work.
pub async fn transition_order<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
    next: OrderStatus,
    actor: Uuid,
    summary: String,
) -> Result<order::Model, ServiceError> {
    let previous = order.status;
    let next = previous.transition_to(next)?;
    let now = Utc::now();

    let mut active = order.into_active_model();
    active.status = Set(next);
    active.updated_at = Set(now);
    if next == OrderStatus::Shipped {
        active.shipped_at = Set(Some(now));
    }
    let order = active.update(conn).await?;

    record_order_status(
        conn,
        order.id,
        Some(previous),
        next,
        Some(actor),
        Some(summary.clone()),
    )
    .await?;
    AuditEntry::new("ORDER_STATUS_CHANGED", "order", order.id)
        .by(actor)
        .before(serde_json::json!({ "status": previous }))
        .after(serde_json::json!({ "status": next }))
        .summary(summary)
        .insert(conn)
        .await?;

    Ok(order)
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItemRequest {
    pub variant_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    /// Defaults to the variant's price.
    #[schema(value_type = Option<f64>)]
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 64))]
    pub order_number: Option<String>,
    #[validate(length(min = 1, max = 200, message = "Customer name is required"))]
    pub customer_name: String,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "An order needs at least one item"))]
    pub items: Vec<CreateOrderItemRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderAction {
    Allocate,
    AllocateWithBackorder,
    AllocateWithCount,
    BulkAllocate,
    MarkFulfilled,
    GenerateSinglePick,
    BulkGeneratePicks,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderActionRequest {
    pub action: OrderAction,
    pub order_id: Option<Uuid>,
    pub order_ids: Option<Vec<Uuid>>,
    /// Allocation mode for BULK_ALLOCATE; strict when absent.
    pub mode: Option<AllocationMode>,
}

impl OrderActionRequest {
    fn single(&self) -> Result<Uuid, ServiceError> {
        self.order_id.ok_or_else(|| {
            ServiceError::ValidationError(format!("orderId is required for {}", self.action))
        })
    }

    fn many(&self) -> Result<Vec<Uuid>, ServiceError> {
        match &self.order_ids {
            Some(ids) if !ids.is_empty() => Ok(ids.clone()),
            _ => Err(ServiceError::ValidationError(format!(
                "orderIds is required for {}",
                self.action
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub allocations: Vec<inventory_allocation::Model>,
    pub backorders: Vec<backorder::Model>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FulfillmentOutcome {
    pub order: order::Model,
    /// Whether the fulfillment platform accepted the update.
    pub synced: bool,
    pub pending_sync_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkItemResult {
    pub order_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pick_list_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkOutcome {
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<BulkItemResult>,
}

impl BulkOutcome {
    fn push(&mut self, result: BulkItemResult) {
        if result.success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OrderActionOutcome {
    Allocation(AllocationOutcome),
    PickList(PickListDetail),
    Fulfilled(FulfillmentOutcome),
    Bulk(BulkOutcome),
}

/// Service for order intake, lookups and order actions.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
    allocation: AllocationService,
    picking: PickingService,
    fulfillment: Arc<dyn FulfillmentPlatform>,
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: EventSender,
        allocation: AllocationService,
        picking: PickingService,
        fulfillment: Arc<dyn FulfillmentPlatform>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            allocation,
            picking,
            fulfillment,
        }
    }

    /// Creates a PENDING order with its items.
    #[instrument(skip(self, request))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
        actor: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
            if matches!(item.unit_price, Some(p) if p < Decimal::ZERO) {
                return Err(ServiceError::ValidationError(
                    "Unit price cannot be negative".into(),
                ));
            }
        }

        let order_number = request
            .order_number
            .clone()
            .unwrap_or_else(|| generate_number("SO"));

        let detail = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let existing = order::Entity::find()
                    .filter(order::Column::OrderNumber.eq(order_number.clone()))
                    .one(txn)
                    .await?;
                if existing.is_some() {
                    return Err(ServiceError::Conflict(format!(
                        "Order number {} already exists",
                        order_number
                    )));
                }

                let now = Utc::now();
                let order = order::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_number: Set(order_number),
                    customer_name: Set(request.customer_name),
                    status: Set(OrderStatus::Pending),
                    notes: Set(request.notes),
                    created_at: Set(now),
                    updated_at: Set(now),
                    shipped_at: Set(None),
                }
                .insert(txn)
                .await?;

                let mut items = Vec::with_capacity(request.items.len());
                for line in request.items {
                    let variant = product_variant::Entity::find_by_id(line.variant_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "Variant {} not found",
                                line.variant_id
                            ))
                        })?;
                    let item = order_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        order_id: Set(order.id),
                        variant_id: Set(variant.id),
                        quantity: Set(line.quantity),
                        quantity_allocated: Set(0),
                        unit_price: Set(line.unit_price.unwrap_or(variant.price)),
                        created_at: Set(now),
                    }
                    .insert(txn)
                    .await?;
                    items.push(item);
                }

                record_order_status(
                    txn,
                    order.id,
                    None,
                    OrderStatus::Pending,
                    Some(actor),
                    Some("Order created".into()),
                )
                .await?;
                AuditEntry::new("ORDER_CREATED", "order", order.id)
                    .by(actor)
                    .after(serde_json::json!({
                        "order_number": order.order_number,
                        "items": items.len(),
                    }))
                    .insert(txn)
                    .await?;

                Ok(OrderDetail {
                    order,
                    items,
                    allocations: Vec::new(),
                    backorders: Vec::new(),
                })
            })
        })
        .await?;

        info!(order_number = %detail.order.order_number, "order created");
        self.event_sender
            .publish(Event::OrderCreated(detail.order.id))
            .await;
        Ok(detail)
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetail, ServiceError> {
        let db = &*self.db_pool;
        let order = order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(db)
            .await?;
        let allocations = inventory_allocation::Entity::find()
            .filter(inventory_allocation::Column::OrderId.eq(order_id))
            .order_by_asc(inventory_allocation::Column::CreatedAt)
            .all(db)
            .await?;
        let backorders = backorder::Entity::find()
            .filter(backorder::Column::OrderId.eq(order_id))
            .all(db)
            .await?;

        Ok(OrderDetail {
            order,
            items,
            allocations,
            backorders,
        })
    }

    #[instrument(skip(self))]
    pub async fn order_history(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_status_history::Model>, ServiceError> {
        let db = &*self.db_pool;
        if order::Entity::find_by_id(order_id).one(db).await?.is_none() {
            return Err(ServiceError::NotFound(format!(
                "Order {} not found",
                order_id
            )));
        }
        Ok(order_status_history::Entity::find()
            .filter(order_status_history::Column::OrderId.eq(order_id))
            .order_by_asc(order_status_history::Column::CreatedAt)
            .all(db)
            .await?)
    }

    /// Dispatches one order action.
    #[instrument(skip(self, request), fields(action = %request.action))]
    pub async fn execute_action(
        &self,
        request: OrderActionRequest,
        actor: Uuid,
    ) -> Result<OrderActionOutcome, ServiceError> {
        match request.action {
            OrderAction::Allocate => self
                .allocation
                .allocate(request.single()?, AllocationMode::Strict, actor)
                .await
                .map(OrderActionOutcome::Allocation),
            OrderAction::AllocateWithBackorder => self
                .allocation
                .allocate(request.single()?, AllocationMode::Backorder, actor)
                .await
                .map(OrderActionOutcome::Allocation),
            OrderAction::AllocateWithCount => self
                .allocation
                .allocate(request.single()?, AllocationMode::Count, actor)
                .await
                .map(OrderActionOutcome::Allocation),
            OrderAction::BulkAllocate => {
                let mode = request.mode.unwrap_or_default();
                Ok(OrderActionOutcome::Bulk(
                    self.bulk_allocate(request.many()?, mode, actor).await,
                ))
            }
            OrderAction::MarkFulfilled => self
                .mark_fulfilled(request.single()?, actor)
                .await
                .map(OrderActionOutcome::Fulfilled),
            OrderAction::GenerateSinglePick => self
                .picking
                .generate_pick_list(vec![request.single()?], actor)
                .await
                .map(OrderActionOutcome::PickList),
            OrderAction::BulkGeneratePicks => Ok(OrderActionOutcome::Bulk(
                self.bulk_generate_picks(request.many()?, actor).await,
            )),
        }
    }

    /// Allocates each order in its own unit of work.
    pub async fn bulk_allocate(
        &self,
        order_ids: Vec<Uuid>,
        mode: AllocationMode,
        actor: Uuid,
    ) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for order_id in order_ids {
            let result = match self.allocation.allocate(order_id, mode, actor).await {
                Ok(allocated) => BulkItemResult {
                    order_id,
                    success: true,
                    status: Some(allocated.status),
                    pick_list_id: None,
                    error: None,
                },
                Err(e) => BulkItemResult {
                    order_id,
                    success: false,
                    status: None,
                    pick_list_id: None,
                    error: Some(e.response_message()),
                },
            };
            outcome.push(result);
        }
        info!(
            successful = outcome.successful,
            failed = outcome.failed,
            "bulk allocation finished"
        );
        outcome
    }

    /// Generates one pick list per order, each in its own unit of work.
    pub async fn bulk_generate_picks(&self, order_ids: Vec<Uuid>, actor: Uuid) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for order_id in order_ids {
            let result = match self.picking.generate_pick_list(vec![order_id], actor).await {
                Ok(detail) => BulkItemResult {
                    order_id,
                    success: true,
                    status: Some(OrderStatus::Picking),
                    pick_list_id: Some(detail.pick_list.id),
                    error: None,
                },
                Err(e) => BulkItemResult {
                    order_id,
                    success: false,
                    status: None,
                    pick_list_id: None,
                    error: Some(e.response_message()),
                },
            };
            outcome.push(result);
        }
        info!(
            successful = outcome.successful,
            failed = outcome.failed,
            "bulk pick generation finished"
        );
        outcome
    }

    /// Ships a PACKED order, then pushes the shipment to the fulfillment
    /// platform. A failed push is recorded as a pending sync; the shipment
    /// stays committed.
    #[instrument(skip(self))]
    pub async fn mark_fulfilled(
        &self,
        order_id: Uuid,
        actor: Uuid,
    ) -> Result<FulfillmentOutcome, ServiceError> {
        let (order, update) = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let order = order::Entity::find_by_id(order_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Order {} not found", order_id))
                    })?;
                let order =
                    transition_order(txn, order, OrderStatus::Shipped, actor, "Shipped".into())
                        .await?;

                let items = order_item::Entity::find()
                    .filter(order_item::Column::OrderId.eq(order_id))
                    .find_also_related(product_variant::Entity)
                    .all(txn)
                    .await?;
                let lines = items
                    .into_iter()
                    .map(|(item, variant)| FulfillmentLine {
                        variant_id: item.variant_id,
                        sku: variant.map(|v| v.sku).unwrap_or_default(),
                        quantity: item.quantity,
                    })
                    .collect();

                let update = FulfillmentUpdate {
                    order_id,
                    order_number: order.order_number.clone(),
                    status: order.status.to_string(),
                    shipped_at: order.shipped_at.unwrap_or_else(Utc::now),
                    lines,
                };
                Ok((order, update))
            })
        })
        .await?;

        self.event_sender
            .publish(Event::OrderStatusChanged {
                order_id,
                old_status: OrderStatus::Packed.to_string(),
                new_status: OrderStatus::Shipped.to_string(),
            })
            .await;

        match self.fulfillment.push_fulfillment(&update).await {
            Ok(()) => {
                info!(order_number = %order.order_number, "order shipped and synced");
                Ok(FulfillmentOutcome {
                    order,
                    synced: true,
                    pending_sync_id: None,
                })
            }
            Err(e) => {
                FULFILLMENT_SYNC_FAILURES.inc();
                warn!(order_number = %order.order_number, error = %e, "fulfillment sync deferred");
                let pending_sync_id = self.record_pending_sync(&update, &e).await;
                if let Some(pending_sync_id) = pending_sync_id {
                    self.event_sender
                        .publish(Event::FulfillmentSyncDeferred {
                            order_id,
                            pending_sync_id,
                        })
                        .await;
                }
                Ok(FulfillmentOutcome {
                    order,
                    synced: false,
                    pending_sync_id,
                })
            }
        }
    }

    async fn record_pending_sync(
        &self,
        update: &FulfillmentUpdate,
        cause: &ServiceError,
    ) -> Option<Uuid> {
        let payload = match serde_json::to_value(update) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "could not serialize fulfillment update");
                return None;
            }
        };
        let now = Utc::now();
        let row = pending_sync::ActiveModel {
            id: Set(Uuid::new_v4()),
            target: Set(FULFILLMENT_SYNC_TARGET.to_string()),
            reference_id: Set(update.order_id),
            payload: Set(payload),
            status: Set(SyncStatus::Pending),
            attempts: Set(1),
            last_error: Set(Some(cause.to_string())),
            created_at: Set(now),
            updated_at: Set(now),
        };
        match row.insert(&*self.db_pool).await {
            Ok(row) => Some(row.id),
            Err(e) => {
                error!(order_id = %update.order_id, error = %e, "could not record pending sync");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_are_screaming_snake_case() {
        let action: OrderAction = serde_json::from_str("\"ALLOCATE_WITH_BACKORDER\"").unwrap();
        assert_eq!(action, OrderAction::AllocateWithBackorder);
        assert_eq!(OrderAction::BulkGeneratePicks.to_string(), "BULK_GENERATE_PICKS");
    }

    #[test]
    fn action_request_requires_targets() {
        let request = OrderActionRequest {
            action: OrderAction::BulkAllocate,
            order_id: None,
            order_ids: Some(vec![]),
            mode: None,
        };
        assert!(request.many().is_err());
        assert!(request.single().is_err());
    }

    #[test]
    fn bulk_outcome_counts_results() {
        let mut outcome = BulkOutcome::default();
        for success in [true, false, true] {
            outcome.push(BulkItemResult {
                order_id: Uuid::new_v4(),
                success,
                status: None,
                pick_list_id: None,
                error: None,
            });
        }
        assert_eq!((outcome.successful, outcome.failed), (2, 1));
    }
}

//! Return merchandise authorizations: intake, receipt, inspection,
//! restocking and refunds.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::unit_of_work;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::REFUNDS;
use crate::models::{
    inventory_transaction::TransactionType,
    location::{self, LocationType},
    order::{self, OrderStatus},
    order_item,
    return_event::{self, ReturnEventType},
    return_item::{self, ItemCondition},
    return_order::{self, RefundStatus, ReturnStatus},
    StatusTransition,
};
use crate::notifications::{NotificationType, Notifier};
use crate::services::audit::AuditEntry;
use crate::services::generate_number;
use crate::services::inventory::{adjust_on_hand, append_ledger, find_or_create_row, LedgerEntry};

/// Refundable quantities of one returned line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundLine {
    pub unit_price: Decimal,
    pub restockable: i32,
    pub disposed: i32,
}

impl From<&return_item::Model> for RefundLine {
    fn from(item: &return_item::Model) -> Self {
        Self {
            unit_price: item.unit_price,
            restockable: item.quantity_restockable,
            disposed: item.quantity_disposed,
        }
    }
}

/// `Σ unit_price × (restockable + disposed) − fee`, never below zero.
pub fn calculate_refund(lines: &[RefundLine], restocking_fee: Decimal) -> Decimal {
    let gross: Decimal = lines
        .iter()
        .map(|l| l.unit_price * Decimal::from(l.restockable + l.disposed))
        .sum();
    (gross - restocking_fee).max(Decimal::ZERO)
}

pub fn generate_rma_number() -> String {
    generate_number("RMA")
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnLineRequest {
    pub order_item_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateReturnRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1, max = 500, message = "A reason is required"))]
    pub reason: String,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<ReturnLineRequest>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RejectReturnRequest {
    #[validate(length(min = 1, max = 500, message = "A rejection reason is required"))]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedLine {
    pub item_id: Uuid,
    pub quantity_received: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveReturnRequest {
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<ReceivedLine>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InspectedLine {
    pub item_id: Uuid,
    pub condition: ItemCondition,
    pub quantity_restockable: i32,
    pub quantity_disposed: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InspectReturnRequest {
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<InspectedLine>,
    #[schema(value_type = Option<f64>)]
    pub restocking_fee: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReturnDetail {
    pub return_order: return_order::Model,
    pub items: Vec<return_item::Model>,
    pub events: Vec<return_event::Model>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestockOutcome {
    pub return_order: return_order::Model,
    pub location_id: Uuid,
    pub units_restocked: i32,
}

async fn load_return<C: ConnectionTrait>(
    conn: &C,
    rma_number: &str,
) -> Result<return_order::Model, ServiceError> {
    return_order::Entity::find()
        .filter(return_order::Column::RmaNumber.eq(rma_number))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Return {} not found", rma_number)))
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    return_id: Uuid,
) -> Result<Vec<return_item::Model>, ServiceError> {
    Ok(return_item::Entity::find()
        .filter(return_item::Column::ReturnId.eq(return_id))
        .order_by_asc(return_item::Column::OrderItemId)
        .all(conn)
        .await?)
}

async fn record_return_event<C: ConnectionTrait>(
    conn: &C,
    return_id: Uuid,
    event_type: ReturnEventType,
    actor: Uuid,
    notes: Option<String>,
    data: Option<serde_json::Value>,
) -> Result<(), ServiceError> {
    return_event::ActiveModel {
        id: Set(Uuid::new_v4()),
        return_id: Set(return_id),
        event_type: Set(event_type),
        user_id: Set(Some(actor)),
        notes: Set(notes),
        data: Set(data),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;
    Ok(())
}

/// Moves a return to `next`, stamping `updated_at`, with an audit event.
async fn move_return<C: ConnectionTrait>(
    conn: &C,
    ret: return_order::Model,
    next: ReturnStatus,
    actor: Uuid,
    edit: impl FnOnce(&mut return_order::ActiveModel),
) -> Result<return_order::Model, ServiceError> {
    let previous = ret.status;
    let next = previous.transition_to(next)?;
    let mut active = ret.into_active_model();
    active.status = Set(next);
    active.updated_at = Set(Utc::now());
    edit(&mut active);
    let ret = active.update(conn).await?;

    AuditEntry::new("RETURN_STATUS_CHANGED", "return_order", ret.id)
        .by(actor)
        .before(serde_json::json!({ "status": previous }))
        .after(serde_json::json!({ "status": next }))
        .summary(format!("{} moved to {}", ret.rma_number, next))
        .insert(conn)
        .await?;
    Ok(ret)
}

/// First active location of `location_type`, oldest first.
async fn restock_location<C: ConnectionTrait>(
    conn: &C,
    location_type: LocationType,
) -> Result<location::Model, ServiceError> {
    location::Entity::find()
        .filter(location::Column::LocationType.eq(location_type))
        .filter(location::Column::IsActive.eq(true))
        .order_by_asc(location::Column::CreatedAt)
        .order_by_asc(location::Column::Code)
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "No active {} location available for restocking",
                location_type
            ))
        })
}

/// Puts restockable units back on hand with RETURNS ledger entries and
/// stamps `restocked_at`.
async fn restock_in<C: ConnectionTrait>(
    conn: &C,
    ret: return_order::Model,
    location_type: LocationType,
    actor: Uuid,
) -> Result<RestockOutcome, ServiceError> {
    if ret.restocked_at.is_some() {
        return Err(ServiceError::Conflict(format!(
            "Return {} has already been restocked",
            ret.rma_number
        )));
    }
    let location = restock_location(conn, location_type).await?;
    let items = load_items(conn, ret.id).await?;

    let mut units = 0;
    for item in items.iter().filter(|i| i.quantity_restockable > 0) {
        let row = find_or_create_row(conn, item.variant_id, location.id).await?;
        adjust_on_hand(conn, row.id, item.quantity_restockable).await?;
        append_ledger(
            conn,
            LedgerEntry {
                variant_id: item.variant_id,
                location_id: location.id,
                transaction_type: TransactionType::Returns,
                quantity_change: item.quantity_restockable,
                reference_type: "RETURN",
                reference_id: Some(ret.id),
                user_id: Some(actor),
                notes: Some(ret.rma_number.clone()),
            },
        )
        .await?;
        units += item.quantity_restockable;
    }

    let return_id = ret.id;
    let mut active = ret.into_active_model();
    active.restocked_at = Set(Some(Utc::now()));
    active.updated_at = Set(Utc::now());
    let ret = active.update(conn).await?;

    record_return_event(
        conn,
        return_id,
        ReturnEventType::Restocked,
        actor,
        Some(format!("Restocked at {}", location.code)),
        Some(serde_json::json!({ "location_id": location.id, "units": units })),
    )
    .await?;
    AuditEntry::new("RETURN_RESTOCKED", "return_order", return_id)
        .by(actor)
        .after(serde_json::json!({ "location_id": location.id, "units": units }))
        .summary(format!("Restocked {} units at {}", units, location.code))
        .insert(conn)
        .await?;

    Ok(RestockOutcome {
        return_order: ret,
        location_id: location.id,
        units_restocked: units,
    })
}

/// Service for processing returns.
#[derive(Clone)]
pub struct ReturnService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
    notifier: Notifier,
    restock_location_type: LocationType,
}

impl ReturnService {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: EventSender,
        notifier: Notifier,
        restock_location_type: LocationType,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            notifier,
            restock_location_type,
        }
    }

    async fn announce(&self, ret: &return_order::Model, message: String) {
        self.event_sender
            .publish(Event::ReturnStatusChanged {
                return_id: ret.id,
                status: ret.status.to_string(),
            })
            .await;
        if let Some(user_id) = ret.created_by {
            self.notifier
                .notify(
                    user_id,
                    NotificationType::ReturnUpdate,
                    &format!("Return {}", ret.rma_number),
                    message,
                )
                .await;
        }
    }

    /// Opens an RMA against a shipped or delivered order.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn create_return(
        &self,
        request: CreateReturnRequest,
        actor: Uuid,
    ) -> Result<ReturnDetail, ServiceError> {
        request.validate()?;
        for line in &request.items {
            line.validate()?;
        }

        let detail = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let order = order::Entity::find_by_id(request.order_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Order {} not found", request.order_id))
                    })?;
                if !matches!(order.status, OrderStatus::Shipped | OrderStatus::Delivered) {
                    return Err(ServiceError::Conflict(format!(
                        "Order {} is {}; only shipped or delivered orders can be returned",
                        order.order_number, order.status
                    )));
                }

                let order_items: HashMap<Uuid, order_item::Model> = order_item::Entity::find()
                    .filter(order_item::Column::OrderId.eq(order.id))
                    .all(txn)
                    .await?
                    .into_iter()
                    .map(|i| (i.id, i))
                    .collect();
                let already_requested = requested_quantities(txn, order.id).await?;

                let mut requested: HashMap<Uuid, i32> = HashMap::new();
                for line in &request.items {
                    let item = order_items.get(&line.order_item_id).ok_or_else(|| {
                        ServiceError::ValidationError(format!(
                            "Item {} does not belong to order {}",
                            line.order_item_id, order.order_number
                        ))
                    })?;
                    let total = requested.entry(item.id).or_insert(0);
                    *total += line.quantity;
                    let prior = already_requested.get(&item.id).copied().unwrap_or(0);
                    if *total + prior > item.quantity {
                        return Err(ServiceError::ValidationError(format!(
                            "Cannot return {} units of item {}; {} ordered, {} already requested",
                            *total, item.id, item.quantity, prior
                        )));
                    }
                }

                let now = Utc::now();
                let ret = return_order::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    rma_number: Set(generate_rma_number()),
                    order_id: Set(order.id),
                    status: Set(ReturnStatus::Pending),
                    reason: Set(request.reason),
                    refund_status: Set(RefundStatus::NotRequested),
                    refund_amount: Set(None),
                    restocking_fee: Set(Decimal::ZERO),
                    rejection_reason: Set(None),
                    created_by: Set(Some(actor)),
                    received_at: Set(None),
                    inspected_at: Set(None),
                    restocked_at: Set(None),
                    refunded_at: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(txn)
                .await?;

                let mut items = Vec::with_capacity(requested.len());
                for (order_item_id, quantity) in requested {
                    let source = &order_items[&order_item_id];
                    let item = return_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        return_id: Set(ret.id),
                        order_item_id: Set(order_item_id),
                        variant_id: Set(source.variant_id),
                        unit_price: Set(source.unit_price),
                        quantity_requested: Set(quantity),
                        quantity_received: Set(0),
                        quantity_restockable: Set(0),
                        quantity_disposed: Set(0),
                        condition: Set(None),
                        inspection_notes: Set(None),
                    }
                    .insert(txn)
                    .await?;
                    items.push(item);
                }

                record_return_event(txn, ret.id, ReturnEventType::Created, actor, None, None)
                    .await?;
                AuditEntry::new("RETURN_CREATED", "return_order", ret.id)
                    .by(actor)
                    .after(serde_json::json!({
                        "rma_number": ret.rma_number,
                        "order_id": ret.order_id,
                        "items": items.len(),
                    }))
                    .insert(txn)
                    .await?;

                let events = load_events(txn, ret.id).await?;
                Ok(ReturnDetail {
                    return_order: ret,
                    items,
                    events,
                })
            })
        })
        .await?;

        info!(rma = %detail.return_order.rma_number, "return created");
        self.event_sender
            .publish(Event::ReturnStatusChanged {
                return_id: detail.return_order.id,
                status: detail.return_order.status.to_string(),
            })
            .await;
        Ok(detail)
    }

    #[instrument(skip(self))]
    pub async fn get_return(&self, rma_number: &str) -> Result<ReturnDetail, ServiceError> {
        let db = &*self.db_pool;
        let return_order = load_return(db, rma_number).await?;
        let items = load_items(db, return_order.id).await?;
        let events = load_events(db, return_order.id).await?;
        Ok(ReturnDetail {
            return_order,
            items,
            events,
        })
    }

    #[instrument(skip(self))]
    pub async fn approve_return(
        &self,
        rma_number: String,
        actor: Uuid,
    ) -> Result<return_order::Model, ServiceError> {
        let ret = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let ret = load_return(txn, &rma_number).await?;
                let ret = move_return(txn, ret, ReturnStatus::Approved, actor, |_| {}).await?;
                record_return_event(txn, ret.id, ReturnEventType::Approved, actor, None, None)
                    .await?;
                Ok(ret)
            })
        })
        .await?;

        self.announce(&ret, "Your return was approved".into()).await;
        Ok(ret)
    }

    #[instrument(skip(self, request))]
    pub async fn reject_return(
        &self,
        rma_number: String,
        request: RejectReturnRequest,
        actor: Uuid,
    ) -> Result<return_order::Model, ServiceError> {
        request.validate()?;
        let reason = request.reason.trim().to_string();
        if reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "A rejection reason is required".into(),
            ));
        }

        let ret = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let ret = load_return(txn, &rma_number).await?;
                let stored = reason.clone();
                let ret = move_return(txn, ret, ReturnStatus::Rejected, actor, move |active| {
                    active.rejection_reason = Set(Some(stored));
                })
                .await?;
                record_return_event(
                    txn,
                    ret.id,
                    ReturnEventType::Rejected,
                    actor,
                    Some(reason),
                    None,
                )
                .await?;
                Ok(ret)
            })
        })
        .await?;

        let message = format!(
            "Your return was rejected: {}",
            ret.rejection_reason.clone().unwrap_or_default()
        );
        self.announce(&ret, message).await;
        Ok(ret)
    }

    /// Records received quantities; items not listed were not received.
    #[instrument(skip(self, request))]
    pub async fn receive_return(
        &self,
        rma_number: String,
        request: ReceiveReturnRequest,
        actor: Uuid,
    ) -> Result<ReturnDetail, ServiceError> {
        request.validate()?;

        let detail = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let ret = load_return(txn, &rma_number).await?;
                let next = ret.status.transition_to(ReturnStatus::Received)?;
                let items = load_items(txn, ret.id).await?;
                let received: HashMap<Uuid, i32> = request
                    .items
                    .iter()
                    .map(|l| (l.item_id, l.quantity_received))
                    .collect();

                for item_id in received.keys() {
                    if !items.iter().any(|i| i.id == *item_id) {
                        return Err(ServiceError::ValidationError(format!(
                            "Item {} is not part of return {}",
                            item_id, ret.rma_number
                        )));
                    }
                }

                let mut updated = Vec::with_capacity(items.len());
                let mut total = 0;
                for item in items {
                    let quantity = received.get(&item.id).copied().unwrap_or(0);
                    if quantity < 0 || quantity > item.quantity_requested {
                        return Err(ServiceError::ValidationError(format!(
                            "Received quantity {} for item {} must be between 0 and {}",
                            quantity, item.id, item.quantity_requested
                        )));
                    }
                    total += quantity;
                    let mut active = item.into_active_model();
                    active.quantity_received = Set(quantity);
                    updated.push(active.update(txn).await?);
                }

                let now = Utc::now();
                let ret = move_return(txn, ret, next, actor, move |active| {
                    active.received_at = Set(Some(now));
                })
                .await?;
                record_return_event(
                    txn,
                    ret.id,
                    ReturnEventType::Received,
                    actor,
                    None,
                    Some(serde_json::json!({ "units_received": total })),
                )
                .await?;

                let events = load_events(txn, ret.id).await?;
                Ok(ReturnDetail {
                    return_order: ret,
                    items: updated,
                    events,
                })
            })
        })
        .await?;

        self.announce(&detail.return_order, "Your return was received".into())
            .await;
        Ok(detail)
    }

    /// Records inspection results and previews the refund.
    #[instrument(skip(self, request))]
    pub async fn inspect_return(
        &self,
        rma_number: String,
        request: InspectReturnRequest,
        actor: Uuid,
    ) -> Result<ReturnDetail, ServiceError> {
        request.validate()?;
        let fee = request.restocking_fee.unwrap_or(Decimal::ZERO);
        if fee < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Restocking fee cannot be negative".into(),
            ));
        }

        let detail = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let ret = load_return(txn, &rma_number).await?;
                let next = ret.status.transition_to(ReturnStatus::InspectionComplete)?;
                let items = load_items(txn, ret.id).await?;
                let mut inspected: HashMap<Uuid, InspectedLine> = request
                    .items
                    .into_iter()
                    .map(|l| (l.item_id, l))
                    .collect();

                if let Some(unknown) = inspected.keys().find(|id| !items.iter().any(|i| i.id == **id)) {
                    return Err(ServiceError::ValidationError(format!(
                        "Item {} is not part of return {}",
                        unknown, ret.rma_number
                    )));
                }

                let mut updated = Vec::with_capacity(items.len());
                for item in items {
                    let Some(line) = inspected.remove(&item.id) else {
                        updated.push(item);
                        continue;
                    };
                    if line.quantity_restockable < 0
                        || line.quantity_disposed < 0
                        || line.quantity_restockable + line.quantity_disposed
                            > item.quantity_received
                    {
                        return Err(ServiceError::ValidationError(format!(
                            "Restockable plus disposed for item {} cannot exceed {} received",
                            item.id, item.quantity_received
                        )));
                    }
                    let mut active = item.into_active_model();
                    active.condition = Set(Some(line.condition));
                    active.quantity_restockable = Set(line.quantity_restockable);
                    active.quantity_disposed = Set(line.quantity_disposed);
                    active.inspection_notes = Set(line.notes);
                    updated.push(active.update(txn).await?);
                }

                let lines: Vec<RefundLine> = updated.iter().map(RefundLine::from).collect();
                let preview = calculate_refund(&lines, fee);
                let now = Utc::now();
                let ret = move_return(txn, ret, next, actor, move |active| {
                    active.inspected_at = Set(Some(now));
                    active.restocking_fee = Set(fee);
                    active.refund_amount = Set(Some(preview));
                    active.refund_status = Set(RefundStatus::Pending);
                })
                .await?;
                record_return_event(
                    txn,
                    ret.id,
                    ReturnEventType::Inspected,
                    actor,
                    None,
                    Some(serde_json::json!({
                        "restocking_fee": fee,
                        "refund_amount": preview,
                    })),
                )
                .await?;

                let events = load_events(txn, ret.id).await?;
                Ok(ReturnDetail {
                    return_order: ret,
                    items: updated,
                    events,
                })
            })
        })
        .await?;

        self.announce(&detail.return_order, "Your return was inspected".into())
            .await;
        Ok(detail)
    }

    /// Restocks an inspected return once.
    #[instrument(skip(self))]
    pub async fn restock_return(
        &self,
        rma_number: String,
        actor: Uuid,
    ) -> Result<RestockOutcome, ServiceError> {
        let location_type = self.restock_location_type;
        let outcome = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let ret = load_return(txn, &rma_number).await?;
                if !matches!(
                    ret.status,
                    ReturnStatus::InspectionComplete | ReturnStatus::Refunded
                ) {
                    return Err(ServiceError::Conflict(format!(
                        "Return {} is {}; inspect it before restocking",
                        ret.rma_number, ret.status
                    )));
                }
                restock_in(txn, ret, location_type, actor).await
            })
        })
        .await?;

        info!(
            rma = %outcome.return_order.rma_number,
            units = outcome.units_restocked,
            "return restocked"
        );
        Ok(outcome)
    }

    /// Completes the refund for an inspected return, restocking it first if
    /// that has not happened yet.
    #[instrument(skip(self))]
    pub async fn process_refund(
        &self,
        rma_number: String,
        actor: Uuid,
    ) -> Result<return_order::Model, ServiceError> {
        let location_type = self.restock_location_type;
        let ret = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let ret = load_return(txn, &rma_number).await?;
                if ret.status != ReturnStatus::InspectionComplete {
                    return Err(ServiceError::Conflict(format!(
                        "Return {} is {}; only INSPECTION_COMPLETE returns can be refunded",
                        ret.rma_number, ret.status
                    )));
                }
                if ret.refund_status == RefundStatus::Completed {
                    return Err(ServiceError::Conflict(format!(
                        "Return {} has already been refunded",
                        ret.rma_number
                    )));
                }

                let items = load_items(txn, ret.id).await?;
                let lines: Vec<RefundLine> = items.iter().map(RefundLine::from).collect();
                let amount = calculate_refund(&lines, ret.restocking_fee);

                let ret = if ret.restocked_at.is_none() {
                    restock_in(txn, ret, location_type, actor).await?.return_order
                } else {
                    ret
                };

                record_return_event(
                    txn,
                    ret.id,
                    ReturnEventType::RefundCompleted,
                    actor,
                    None,
                    Some(serde_json::json!({ "amount": amount })),
                )
                .await?;

                let now = Utc::now();
                move_return(txn, ret, ReturnStatus::Refunded, actor, move |active| {
                    active.refund_status = Set(RefundStatus::Completed);
                    active.refund_amount = Set(Some(amount));
                    active.refunded_at = Set(Some(now));
                })
                .await
            })
        })
        .await?;

        let amount = ret.refund_amount.unwrap_or(Decimal::ZERO);
        REFUNDS.inc();
        info!(rma = %ret.rma_number, %amount, "refund processed");
        self.event_sender
            .publish(Event::RefundProcessed {
                return_id: ret.id,
                amount,
            })
            .await;
        self.announce(&ret, format!("Your refund of {} was processed", amount))
            .await;
        Ok(ret)
    }
}

async fn load_events<C: ConnectionTrait>(
    conn: &C,
    return_id: Uuid,
) -> Result<Vec<return_event::Model>, ServiceError> {
    Ok(return_event::Entity::find()
        .filter(return_event::Column::ReturnId.eq(return_id))
        .order_by_asc(return_event::Column::CreatedAt)
        .all(conn)
        .await?)
}

/// Quantities already requested per order item on returns that were not
/// rejected.
async fn requested_quantities<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<HashMap<Uuid, i32>, ServiceError> {
    let open_returns: Vec<Uuid> = return_order::Entity::find()
        .filter(return_order::Column::OrderId.eq(order_id))
        .filter(return_order::Column::Status.ne(ReturnStatus::Rejected))
        .all(conn)
        .await?
        .into_iter()
        .map(|r| r.id)
        .collect();
    if open_returns.is_empty() {
        return Ok(HashMap::new());
    }

    let mut totals = HashMap::new();
    for item in return_item::Entity::find()
        .filter(return_item::Column::ReturnId.is_in(open_returns))
        .all(conn)
        .await?
    {
        *totals.entry(item.order_item_id).or_insert(0) += item.quantity_requested;
    }
    Ok(totals)
}

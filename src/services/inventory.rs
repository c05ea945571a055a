//! Inventory rows and the inventory ledger.
//!
//! Quantity changes are single guarded `UPDATE` statements whose
//! rows-affected count is checked, so concurrent writers cannot push
//! `quantity_reserved` above `quantity_on_hand` under READ COMMITTED.

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::db::unit_of_work;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{
    inventory,
    inventory_transaction::{self, TransactionType},
    location, product_variant,
};
use crate::services::audit::AuditEntry;

/// One ledger line to append.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub variant_id: Uuid,
    pub location_id: Uuid,
    pub transaction_type: TransactionType,
    pub quantity_change: i32,
    pub reference_type: &'static str,
    pub reference_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub notes: Option<String>,
}

pub async fn append_ledger<C: ConnectionTrait>(
    conn: &C,
    entry: LedgerEntry,
) -> Result<inventory_transaction::Model, ServiceError> {
    let row = inventory_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        variant_id: Set(entry.variant_id),
        location_id: Set(entry.location_id),
        transaction_type: Set(entry.transaction_type),
        quantity_change: Set(entry.quantity_change),
        reference_type: Set(entry.reference_type.to_string()),
        reference_id: Set(entry.reference_id),
        user_id: Set(entry.user_id),
        notes: Set(entry.notes),
        created_at: Set(Utc::now()),
    };
    Ok(row.insert(conn).await?)
}

pub async fn find_row<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
    location_id: Uuid,
) -> Result<Option<inventory::Model>, ServiceError> {
    Ok(inventory::Entity::find()
        .filter(inventory::Column::VariantId.eq(variant_id))
        .filter(inventory::Column::LocationId.eq(location_id))
        .one(conn)
        .await?)
}

pub async fn require_row<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
    location_id: Uuid,
) -> Result<inventory::Model, ServiceError> {
    find_row(conn, variant_id, location_id).await?.ok_or_else(|| {
        ServiceError::NotFound(format!(
            "No inventory for variant {} at location {}",
            variant_id, location_id
        ))
    })
}

pub async fn find_or_create_row<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
    location_id: Uuid,
) -> Result<inventory::Model, ServiceError> {
    if let Some(row) = find_row(conn, variant_id, location_id).await? {
        return Ok(row);
    }
    let now = Utc::now();
    let row = inventory::ActiveModel {
        id: Set(Uuid::new_v4()),
        variant_id: Set(variant_id),
        location_id: Set(location_id),
        quantity_on_hand: Set(0),
        quantity_reserved: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    };
    Ok(row.insert(conn).await?)
}

/// Every inventory row for `variant_id`.
pub async fn rows_for_variant<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
) -> Result<Vec<inventory::Model>, ServiceError> {
    Ok(inventory::Entity::find()
        .filter(inventory::Column::VariantId.eq(variant_id))
        .order_by_asc(inventory::Column::LocationId)
        .all(conn)
        .await?)
}

fn guard_failed(row_id: Uuid, what: &str) -> ServiceError {
    ServiceError::Conflict(format!(
        "Inventory row {} changed concurrently; {}",
        row_id, what
    ))
}

/// `reserved += quantity` provided `on_hand - reserved >= quantity`.
pub async fn reserve<C: ConnectionTrait>(
    conn: &C,
    row_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = inventory::Entity::update_many()
        .col_expr(
            inventory::Column::QuantityReserved,
            Expr::col(inventory::Column::QuantityReserved).add(quantity),
        )
        .col_expr(inventory::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(inventory::Column::Id.eq(row_id))
        .filter(
            Expr::expr(
                Expr::col(inventory::Column::QuantityOnHand)
                    .sub(Expr::col(inventory::Column::QuantityReserved)),
            )
            .gte(quantity),
        )
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(guard_failed(row_id, "not enough available stock to reserve"));
    }
    Ok(())
}

/// `reserved -= quantity` provided `reserved >= quantity`.
pub async fn release<C: ConnectionTrait>(
    conn: &C,
    row_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    if quantity == 0 {
        return Ok(());
    }
    let result = inventory::Entity::update_many()
        .col_expr(
            inventory::Column::QuantityReserved,
            Expr::col(inventory::Column::QuantityReserved).sub(quantity),
        )
        .col_expr(inventory::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(inventory::Column::Id.eq(row_id))
        .filter(inventory::Column::QuantityReserved.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(guard_failed(row_id, "reservation is smaller than the release"));
    }
    Ok(())
}

/// Removes picked units: `on_hand -= quantity` and `reserved -= quantity`.
pub async fn consume_reserved<C: ConnectionTrait>(
    conn: &C,
    row_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = inventory::Entity::update_many()
        .col_expr(
            inventory::Column::QuantityOnHand,
            Expr::col(inventory::Column::QuantityOnHand).sub(quantity),
        )
        .col_expr(
            inventory::Column::QuantityReserved,
            Expr::col(inventory::Column::QuantityReserved).sub(quantity),
        )
        .col_expr(inventory::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(inventory::Column::Id.eq(row_id))
        .filter(inventory::Column::QuantityReserved.gte(quantity))
        .filter(inventory::Column::QuantityOnHand.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(guard_failed(row_id, "picked quantity is not reserved"));
    }
    Ok(())
}

/// `on_hand -= quantity` provided the unreserved stock covers it.
pub async fn withdraw_available<C: ConnectionTrait>(
    conn: &C,
    row_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = inventory::Entity::update_many()
        .col_expr(
            inventory::Column::QuantityOnHand,
            Expr::col(inventory::Column::QuantityOnHand).sub(quantity),
        )
        .col_expr(inventory::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(inventory::Column::Id.eq(row_id))
        .filter(
            Expr::expr(
                Expr::col(inventory::Column::QuantityOnHand)
                    .sub(Expr::col(inventory::Column::QuantityReserved)),
            )
            .gte(quantity),
        )
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InsufficientStock(format!(
            "Inventory row {} has less than {} unreserved units",
            row_id, quantity
        )));
    }
    Ok(())
}

/// `on_hand += delta` (signed) provided the result stays at or above `reserved`.
pub async fn adjust_on_hand<C: ConnectionTrait>(
    conn: &C,
    row_id: Uuid,
    delta: i32,
) -> Result<(), ServiceError> {
    if delta == 0 {
        return Ok(());
    }
    let result = inventory::Entity::update_many()
        .col_expr(
            inventory::Column::QuantityOnHand,
            Expr::col(inventory::Column::QuantityOnHand).add(delta),
        )
        .col_expr(inventory::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(inventory::Column::Id.eq(row_id))
        .filter(
            Expr::expr(
                Expr::col(inventory::Column::QuantityOnHand)
                    .add(delta)
                    .sub(Expr::col(inventory::Column::QuantityReserved)),
            )
            .gte(0),
        )
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::Conflict(format!(
            "Adjusting inventory row {} by {} would leave reserved stock uncovered",
            row_id, delta
        )));
    }
    Ok(())
}

pub async fn load_variant<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
) -> Result<product_variant::Model, ServiceError> {
    product_variant::Entity::find_by_id(variant_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))
}

pub async fn load_location<C: ConnectionTrait>(
    conn: &C,
    location_id: Uuid,
) -> Result<location::Model, ServiceError> {
    location::Entity::find_by_id(location_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Location {} not found", location_id)))
}

pub async fn load_active_location<C: ConnectionTrait>(
    conn: &C,
    location_id: Uuid,
) -> Result<location::Model, ServiceError> {
    let location = load_location(conn, location_id).await?;
    if !location.is_active {
        return Err(ServiceError::ValidationError(format!(
            "Location {} is inactive",
            location.code
        )));
    }
    Ok(location)
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveStockRequest {
    pub variant_id: Uuid,
    pub location_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InventoryQuery {
    pub variant_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InventoryView {
    #[serde(flatten)]
    pub row: inventory::Model,
    pub quantity_available: i32,
}

impl From<inventory::Model> for InventoryView {
    fn from(row: inventory::Model) -> Self {
        Self {
            quantity_available: row.available(),
            row,
        }
    }
}

/// Stock receipt and inventory queries.
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl InventoryService {
    pub fn new(db_pool: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Adds received units to a location and records a RECEIPT ledger entry.
    #[instrument(skip(self, request), fields(variant_id = %request.variant_id, location_id = %request.location_id))]
    pub async fn receive(
        &self,
        request: ReceiveStockRequest,
        actor: Uuid,
    ) -> Result<InventoryView, ServiceError> {
        request.validate()?;
        let ReceiveStockRequest {
            variant_id,
            location_id,
            quantity,
            notes,
        } = request;

        let row = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                load_variant(txn, variant_id).await?;
                load_active_location(txn, location_id).await?;

                let row = find_or_create_row(txn, variant_id, location_id).await?;
                adjust_on_hand(txn, row.id, quantity).await?;
                append_ledger(
                    txn,
                    LedgerEntry {
                        variant_id,
                        location_id,
                        transaction_type: TransactionType::Receipt,
                        quantity_change: quantity,
                        reference_type: "RECEIPT",
                        reference_id: None,
                        user_id: Some(actor),
                        notes,
                    },
                )
                .await?;

                let updated = inventory::Entity::find_by_id(row.id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::InternalError("inventory row vanished".into()))?;

                AuditEntry::new("INVENTORY_RECEIVED", "inventory", updated.id)
                    .by(actor)
                    .before(serde_json::json!({ "quantity_on_hand": row.quantity_on_hand }))
                    .after(serde_json::json!({ "quantity_on_hand": updated.quantity_on_hand }))
                    .summary(format!("Received {} units", quantity))
                    .insert(txn)
                    .await?;

                Ok(updated)
            })
        })
        .await?;

        info!(quantity, "stock received");
        self.event_sender
            .publish(Event::InventoryReceived {
                variant_id,
                location_id,
                quantity,
            })
            .await;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    pub async fn list(&self, query: InventoryQuery) -> Result<Vec<InventoryView>, ServiceError> {
        let mut select = inventory::Entity::find();
        if let Some(variant_id) = query.variant_id {
            select = select.filter(inventory::Column::VariantId.eq(variant_id));
        }
        if let Some(location_id) = query.location_id {
            select = select.filter(inventory::Column::LocationId.eq(location_id));
        }
        let rows = select
            .order_by_asc(inventory::Column::VariantId)
            .order_by_asc(inventory::Column::LocationId)
            .all(&*self.db_pool)
            .await?;
        Ok(rows.into_iter().map(InventoryView::from).collect())
    }

    /// Ledger entries, newest first.
    #[instrument(skip(self))]
    pub async fn transactions(
        &self,
        variant_id: Option<Uuid>,
    ) -> Result<Vec<inventory_transaction::Model>, ServiceError> {
        let mut select = inventory_transaction::Entity::find();
        if let Some(variant_id) = variant_id {
            select = select.filter(inventory_transaction::Column::VariantId.eq(variant_id));
        }
        Ok(select
            .order_by_desc(inventory_transaction::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?)
    }
}

//! Pick lists and pick/pack work tasks.
//!
//! Every scan is checked against the item's variant codes and its
//! location's barcode before anything is written. List and task counters
//! are recomputed from their items after each scan.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::unit_of_work;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::{PICKS, SCAN_MISMATCHES};
use crate::models::{
    backorder::{self, BackorderStatus},
    fulfillment_event::{self, FulfillmentEventType},
    inventory_allocation,
    inventory_transaction::TransactionType,
    location,
    order::{self, OrderStatus},
    order_item,
    pick_list::{self, WorkStatus},
    pick_list_item::{self, WorkItemStatus},
    product_variant, task_item,
    work_task::{self, TaskType},
    StatusTransition,
};
use crate::notifications::{NotificationType, Notifier};
use crate::services::audit::AuditEntry;
use crate::services::generate_number;
use crate::services::inventory::{
    append_ledger, consume_reserved, load_location, load_variant, release, require_row,
    LedgerEntry,
};
use crate::services::orders::transition_order;

const PICK_LIST_SOURCE: &str = "PICK_LIST";
const WORK_TASK_SOURCE: &str = "WORK_TASK";

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// True when `scanned` equals one of the variant's codes or the location's
/// barcode, ignoring case and surrounding whitespace.
pub fn scan_matches(
    scanned: &str,
    variant: &product_variant::Model,
    location: &location::Model,
) -> bool {
    let scanned = normalize_code(scanned);
    if scanned.is_empty() {
        return false;
    }
    variant
        .scan_codes()
        .chain(location.barcode.as_deref())
        .any(|code| normalize_code(code) == scanned)
}

/// Progress derived from a list's or task's items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ItemProgress {
    pub total_items: i32,
    pub finished_items: i32,
    pub total_orders: i32,
    /// Orders whose items are all finished, in id order.
    pub finished_orders: Vec<Uuid>,
}

impl ItemProgress {
    pub fn all_finished(&self) -> bool {
        self.total_items > 0 && self.finished_items == self.total_items
    }

    pub fn completed_orders(&self) -> i32 {
        self.finished_orders.len() as i32
    }
}

/// An item is finished once it leaves PENDING.
pub fn summarize_items(items: &[(Uuid, WorkItemStatus)]) -> ItemProgress {
    let mut per_order: BTreeMap<Uuid, bool> = BTreeMap::new();
    let mut progress = ItemProgress::default();

    for (order_id, status) in items {
        let finished = status.is_terminal();
        progress.total_items += 1;
        if finished {
            progress.finished_items += 1;
        }
        let entry = per_order.entry(*order_id).or_insert(true);
        *entry &= finished;
    }

    progress.total_orders = per_order.len() as i32;
    progress.finished_orders = per_order
        .into_iter()
        .filter_map(|(order_id, done)| done.then_some(order_id))
        .collect();
    progress
}

/// Moves a PENDING or ASSIGNED list/task to IN_PROGRESS, then to COMPLETED
/// once every item is finished.
fn next_work_status(current: WorkStatus, progress: &ItemProgress) -> Result<WorkStatus, ServiceError> {
    let mut status = current;
    if matches!(status, WorkStatus::Pending | WorkStatus::Assigned) {
        status = status.transition_to(WorkStatus::InProgress)?;
    }
    if progress.all_finished() && status == WorkStatus::InProgress {
        status = status.transition_to(WorkStatus::Completed)?;
    }
    Ok(status)
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PickItemRequest {
    #[validate(range(min = 1, message = "Picked quantity must be positive"))]
    pub quantity_picked: i32,
    /// Picker; defaults to the authenticated user.
    pub user_id: Option<Uuid>,
    #[validate(length(min = 1, message = "A scanned code is required"))]
    pub scanned_code: String,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, message = "At least one order is required"))]
    pub order_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTaskItemRequest {
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    #[validate(length(min = 1, message = "A scanned code is required"))]
    pub scanned_code: String,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PickListDetail {
    pub pick_list: pick_list::Model,
    pub items: Vec<pick_list_item::Model>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    pub task: work_task::Model,
    pub items: Vec<task_item::Model>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PickOutcome {
    pub pick_list: pick_list::Model,
    pub item: pick_list_item::Model,
    /// Orders moved to PICKED by this scan.
    pub orders_picked: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskItemOutcome {
    pub task: work_task::Model,
    pub item: task_item::Model,
    /// Orders whose status advanced because of this scan.
    pub orders_advanced: Vec<Uuid>,
}

struct EventRecord<'a> {
    source_type: &'a str,
    source_id: Uuid,
    item_id: Option<Uuid>,
    event_type: FulfillmentEventType,
    user_id: Uuid,
    scanned_code: Option<String>,
    quantity: i32,
    notes: Option<String>,
}

async fn record_event<C: ConnectionTrait>(
    conn: &C,
    event: EventRecord<'_>,
) -> Result<(), ServiceError> {
    fulfillment_event::ActiveModel {
        id: Set(Uuid::new_v4()),
        source_type: Set(event.source_type.to_string()),
        source_id: Set(event.source_id),
        item_id: Set(event.item_id),
        event_type: Set(event.event_type),
        user_id: Set(Some(event.user_id)),
        scanned_code: Set(event.scanned_code),
        quantity: Set(event.quantity),
        notes: Set(event.notes),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;
    Ok(())
}

async fn load_orders_with_status<C: ConnectionTrait>(
    conn: &C,
    order_ids: &[Uuid],
    required: OrderStatus,
) -> Result<Vec<order::Model>, ServiceError> {
    let mut orders = Vec::with_capacity(order_ids.len());
    for order_id in order_ids {
        let order = order::Entity::find_by_id(*order_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        if order.status != required {
            return Err(ServiceError::Conflict(format!(
                "Order {} is {}; expected {}",
                order.order_number, order.status, required
            )));
        }
        orders.push(order);
    }
    Ok(orders)
}

fn dedup_ids(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = BTreeSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Allocations of `order_ids`, in walking order (location code, then variant).
async fn allocations_in_walk_order<C: ConnectionTrait>(
    conn: &C,
    order_ids: &[Uuid],
) -> Result<Vec<inventory_allocation::Model>, ServiceError> {
    let allocations = inventory_allocation::Entity::find()
        .filter(inventory_allocation::Column::OrderId.is_in(order_ids.to_vec()))
        .all(conn)
        .await?;
    if allocations.is_empty() {
        return Err(ServiceError::ValidationError(
            "Selected orders have no allocations to pick".into(),
        ));
    }

    let location_ids: Vec<Uuid> = allocations.iter().map(|a| a.location_id).collect();
    let codes: HashMap<Uuid, String> = location::Entity::find()
        .filter(location::Column::Id.is_in(location_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|l| (l.id, l.code))
        .collect();

    let mut allocations = allocations;
    allocations.sort_by(|a, b| {
        let code_a = codes.get(&a.location_id).map(String::as_str).unwrap_or("");
        let code_b = codes.get(&b.location_id).map(String::as_str).unwrap_or("");
        code_a
            .cmp(code_b)
            .then_with(|| a.variant_id.cmp(&b.variant_id))
            .then_with(|| a.order_id.cmp(&b.order_id))
    });
    Ok(allocations)
}

/// Builds a pick list from the allocations of ALLOCATED orders and moves
/// those orders to PICKING.
pub async fn generate_pick_list_in<C: ConnectionTrait>(
    conn: &C,
    order_ids: Vec<Uuid>,
    actor: Uuid,
) -> Result<PickListDetail, ServiceError> {
    let order_ids = dedup_ids(order_ids);
    if order_ids.is_empty() {
        return Err(ServiceError::ValidationError(
            "At least one order is required".into(),
        ));
    }
    let orders = load_orders_with_status(conn, &order_ids, OrderStatus::Allocated).await?;
    let allocations = allocations_in_walk_order(conn, &order_ids).await?;

    let now = Utc::now();
    let pick_list = pick_list::ActiveModel {
        id: Set(Uuid::new_v4()),
        pick_list_number: Set(generate_number("PL")),
        status: Set(WorkStatus::Pending),
        assigned_to: Set(None),
        total_items: Set(allocations.len() as i32),
        picked_items: Set(0),
        started_at: Set(None),
        completed_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;

    let mut items = Vec::with_capacity(allocations.len());
    for (index, allocation) in allocations.into_iter().enumerate() {
        let item = pick_list_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            pick_list_id: Set(pick_list.id),
            order_id: Set(allocation.order_id),
            order_item_id: Set(allocation.order_item_id),
            variant_id: Set(allocation.variant_id),
            location_id: Set(allocation.location_id),
            quantity_to_pick: Set(allocation.quantity),
            quantity_picked: Set(0),
            pick_sequence: Set(index as i32 + 1),
            status: Set(WorkItemStatus::Pending),
            picked_by: Set(None),
            picked_at: Set(None),
            notes: Set(None),
        }
        .insert(conn)
        .await?;
        items.push(item);
    }

    for order in orders {
        transition_order(
            conn,
            order,
            OrderStatus::Picking,
            actor,
            format!("Added to pick list {}", pick_list.pick_list_number),
        )
        .await?;
    }

    AuditEntry::new("PICK_LIST_GENERATED", "pick_list", pick_list.id)
        .by(actor)
        .after(serde_json::json!({
            "pick_list_number": pick_list.pick_list_number,
            "orders": order_ids,
            "total_items": pick_list.total_items,
        }))
        .summary(format!(
            "Generated {} with {} item(s)",
            pick_list.pick_list_number, pick_list.total_items
        ))
        .insert(conn)
        .await?;

    Ok(PickListDetail { pick_list, items })
}

/// Decrements reserved stock for a picked quantity and releases whatever
/// part of the reservation was not picked.
#[allow(clippy::too_many_arguments)]
async fn take_from_location<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
    location_id: Uuid,
    required: i32,
    picked: i32,
    reference_type: &'static str,
    reference_id: Uuid,
    actor: Uuid,
) -> Result<(), ServiceError> {
    let row = require_row(conn, variant_id, location_id).await?;
    consume_reserved(conn, row.id, picked).await?;
    append_ledger(
        conn,
        LedgerEntry {
            variant_id,
            location_id,
            transaction_type: TransactionType::Pick,
            quantity_change: -picked,
            reference_type,
            reference_id: Some(reference_id),
            user_id: Some(actor),
            notes: None,
        },
    )
    .await?;

    let unpicked = required - picked;
    if unpicked > 0 {
        release(conn, row.id, unpicked).await?;
        append_ledger(
            conn,
            LedgerEntry {
                variant_id,
                location_id,
                transaction_type: TransactionType::Allocation,
                quantity_change: -unpicked,
                reference_type,
                reference_id: Some(reference_id),
                user_id: Some(actor),
                notes: Some("Short pick released reservation".into()),
            },
        )
        .await?;
    }
    Ok(())
}

/// Hands the unpicked part of an order line back to the allocator: the
/// line's allocated count drops and a pending backorder records the gap.
async fn backorder_unpicked<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    order_item_id: Option<Uuid>,
    variant_id: Uuid,
    unpicked: i32,
) -> Result<(), ServiceError> {
    if unpicked <= 0 {
        return Ok(());
    }
    let line = match order_item_id {
        Some(id) => order_item::Entity::find_by_id(id).one(conn).await?,
        None => {
            order_item::Entity::find()
                .filter(order_item::Column::OrderId.eq(order_id))
                .filter(order_item::Column::VariantId.eq(variant_id))
                .one(conn)
                .await?
        }
    };
    let Some(line) = line else {
        warn!(%order_id, %variant_id, "short pick has no matching order line");
        return Ok(());
    };

    let line_id = line.id;
    let allocated = (line.quantity_allocated - unpicked).max(0);
    let mut active = line.into_active_model();
    active.quantity_allocated = Set(allocated);
    active.update(conn).await?;

    backorder::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        order_item_id: Set(line_id),
        variant_id: Set(variant_id),
        quantity_short: Set(unpicked),
        status: Set(BackorderStatus::Pending),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;
    Ok(())
}

async fn pick_list_items<C: ConnectionTrait>(
    conn: &C,
    pick_list_id: Uuid,
) -> Result<Vec<pick_list_item::Model>, ServiceError> {
    Ok(pick_list_item::Entity::find()
        .filter(pick_list_item::Column::PickListId.eq(pick_list_id))
        .order_by_asc(pick_list_item::Column::PickSequence)
        .all(conn)
        .await?)
}

async fn task_items<C: ConnectionTrait>(
    conn: &C,
    task_id: Uuid,
) -> Result<Vec<task_item::Model>, ServiceError> {
    Ok(task_item::Entity::find()
        .filter(task_item::Column::TaskId.eq(task_id))
        .order_by_asc(task_item::Column::Sequence)
        .all(conn)
        .await?)
}

async fn load_pick_list<C: ConnectionTrait>(
    conn: &C,
    pick_list_id: Uuid,
) -> Result<pick_list::Model, ServiceError> {
    pick_list::Entity::find_by_id(pick_list_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Pick list {} not found", pick_list_id)))
}

async fn load_task<C: ConnectionTrait>(
    conn: &C,
    task_id: Uuid,
) -> Result<work_task::Model, ServiceError> {
    work_task::Entity::find_by_id(task_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Task {} not found", task_id)))
}

/// Moves every order in `order_ids` that is still in `from` to `to`.
async fn advance_orders<C: ConnectionTrait>(
    conn: &C,
    order_ids: &[Uuid],
    from: OrderStatus,
    to: OrderStatus,
    actor: Uuid,
    summary: &str,
) -> Result<Vec<Uuid>, ServiceError> {
    let mut advanced = Vec::new();
    for order_id in order_ids {
        let Some(order) = order::Entity::find_by_id(*order_id).one(conn).await? else {
            continue;
        };
        if order.status != from {
            continue;
        }
        transition_order(conn, order, to, actor, summary.to_string()).await?;
        advanced.push(*order_id);
    }
    Ok(advanced)
}

/// Lines already picked for `order_ids`, from pick lists and picking tasks.
async fn picked_lines<C: ConnectionTrait>(
    conn: &C,
    order_ids: &[Uuid],
) -> Result<Vec<(Uuid, Uuid, Uuid, i32)>, ServiceError> {
    let mut lines: Vec<(Uuid, Uuid, Uuid, i32)> = pick_list_item::Entity::find()
        .filter(pick_list_item::Column::OrderId.is_in(order_ids.to_vec()))
        .filter(pick_list_item::Column::QuantityPicked.gt(0))
        .order_by_asc(pick_list_item::Column::PickSequence)
        .all(conn)
        .await?
        .into_iter()
        .map(|i| (i.order_id, i.variant_id, i.location_id, i.quantity_picked))
        .collect();

    let picking_tasks: Vec<Uuid> = work_task::Entity::find()
        .filter(work_task::Column::TaskType.eq(TaskType::Picking))
        .all(conn)
        .await?
        .into_iter()
        .map(|t| t.id)
        .collect();
    if !picking_tasks.is_empty() {
        let task_lines = task_item::Entity::find()
            .filter(task_item::Column::TaskId.is_in(picking_tasks))
            .filter(task_item::Column::OrderId.is_in(order_ids.to_vec()))
            .filter(task_item::Column::QuantityCompleted.gt(0))
            .order_by_asc(task_item::Column::Sequence)
            .all(conn)
            .await?;
        lines.extend(
            task_lines
                .into_iter()
                .map(|i| (i.order_id, i.variant_id, i.location_id, i.quantity_completed)),
        );
    }
    Ok(lines)
}

/// Rejects orders that already sit on an open packing task.
async fn ensure_not_in_open_packing<C: ConnectionTrait>(
    conn: &C,
    order_ids: &[Uuid],
) -> Result<(), ServiceError> {
    let open_packing: Vec<Uuid> = work_task::Entity::find()
        .filter(work_task::Column::TaskType.eq(TaskType::Packing))
        .filter(work_task::Column::Status.ne(WorkStatus::Cancelled))
        .all(conn)
        .await?
        .into_iter()
        .map(|t| t.id)
        .collect();
    if open_packing.is_empty() {
        return Ok(());
    }
    let existing = task_item::Entity::find()
        .filter(task_item::Column::TaskId.is_in(open_packing))
        .filter(task_item::Column::OrderId.is_in(order_ids.to_vec()))
        .one(conn)
        .await?;
    match existing {
        Some(item) => Err(ServiceError::Conflict(format!(
            "Order {} already has a packing task",
            item.order_id
        ))),
        None => Ok(()),
    }
}

/// Creates a PICKING task for ALLOCATED orders or a PACKING task for PICKED
/// orders.
pub async fn create_task_in<C: ConnectionTrait>(
    conn: &C,
    task_type: TaskType,
    order_ids: Vec<Uuid>,
    actor: Uuid,
) -> Result<TaskDetail, ServiceError> {
    let order_ids = dedup_ids(order_ids);
    let required = match task_type {
        TaskType::Picking => OrderStatus::Allocated,
        TaskType::Packing => OrderStatus::Picked,
    };
    let orders = load_orders_with_status(conn, &order_ids, required).await?;

    let lines: Vec<(Uuid, Uuid, Uuid, i32)> = match task_type {
        TaskType::Picking => allocations_in_walk_order(conn, &order_ids)
            .await?
            .into_iter()
            .map(|a| (a.order_id, a.variant_id, a.location_id, a.quantity))
            .collect(),
        TaskType::Packing => {
            ensure_not_in_open_packing(conn, &order_ids).await?;
            let lines = picked_lines(conn, &order_ids).await?;
            if lines.is_empty() {
                return Err(ServiceError::ValidationError(
                    "Selected orders have no picked items to pack".into(),
                ));
            }
            lines
        }
    };

    let now = Utc::now();
    let distinct_orders: BTreeSet<Uuid> = lines.iter().map(|l| l.0).collect();
    let task = work_task::ActiveModel {
        id: Set(Uuid::new_v4()),
        task_number: Set(generate_number("TASK")),
        task_type: Set(task_type),
        status: Set(WorkStatus::Pending),
        assigned_to: Set(None),
        total_items: Set(lines.len() as i32),
        completed_items: Set(0),
        total_orders: Set(distinct_orders.len() as i32),
        completed_orders: Set(0),
        started_at: Set(None),
        completed_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for (index, (order_id, variant_id, location_id, quantity)) in lines.into_iter().enumerate() {
        let item = task_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            task_id: Set(task.id),
            order_id: Set(order_id),
            variant_id: Set(variant_id),
            location_id: Set(location_id),
            quantity_required: Set(quantity),
            quantity_completed: Set(0),
            sequence: Set(index as i32 + 1),
            status: Set(WorkItemStatus::Pending),
            completed_by: Set(None),
            completed_at: Set(None),
            notes: Set(None),
        }
        .insert(conn)
        .await?;
        items.push(item);
    }

    if task_type == TaskType::Picking {
        for order in orders {
            transition_order(
                conn,
                order,
                OrderStatus::Picking,
                actor,
                format!("Added to picking task {}", task.task_number),
            )
            .await?;
        }
    }

    AuditEntry::new("WORK_TASK_CREATED", "work_task", task.id)
        .by(actor)
        .after(serde_json::json!({
            "task_number": task.task_number,
            "task_type": task.task_type,
            "orders": order_ids,
        }))
        .summary(format!(
            "Created {} task with {} item(s)",
            task.task_type, task.total_items
        ))
        .insert(conn)
        .await?;

    Ok(TaskDetail { task, items })
}

/// Pick lists, work tasks and scan processing.
#[derive(Clone)]
pub struct PickingService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
    notifier: Notifier,
}

impl PickingService {
    pub fn new(db_pool: Arc<DatabaseConnection>, event_sender: EventSender, notifier: Notifier) -> Self {
        Self {
            db_pool,
            event_sender,
            notifier,
        }
    }

    async fn verify_scan(
        &self,
        variant_id: Uuid,
        location_id: Uuid,
        scanned_code: &str,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let variant = load_variant(db, variant_id).await?;
        let location = load_location(db, location_id).await?;
        if scan_matches(scanned_code, &variant, &location) {
            return Ok(());
        }
        SCAN_MISMATCHES.inc();
        warn!(sku = %variant.sku, location = %location.code, "scan mismatch");
        Err(ServiceError::ValidationError(format!(
            "Scanned code {} does not match {} at {}",
            scanned_code.trim(),
            variant.sku,
            location.code
        )))
    }

    async fn publish_order_changes(&self, order_ids: &[Uuid], old: OrderStatus, new: OrderStatus) {
        for order_id in order_ids {
            self.event_sender
                .publish(Event::OrderStatusChanged {
                    order_id: *order_id,
                    old_status: old.to_string(),
                    new_status: new.to_string(),
                })
                .await;
        }
    }

    #[instrument(skip(self))]
    pub async fn generate_pick_list(
        &self,
        order_ids: Vec<Uuid>,
        actor: Uuid,
    ) -> Result<PickListDetail, ServiceError> {
        let detail = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move { generate_pick_list_in(txn, order_ids, actor).await })
        })
        .await?;

        let orders: Vec<Uuid> = detail
            .items
            .iter()
            .map(|i| i.order_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        info!(
            pick_list = %detail.pick_list.pick_list_number,
            orders = orders.len(),
            "pick list generated"
        );
        self.publish_order_changes(&orders, OrderStatus::Allocated, OrderStatus::Picking)
            .await;
        Ok(detail)
    }

    #[instrument(skip(self))]
    pub async fn get_pick_list(&self, pick_list_id: Uuid) -> Result<PickListDetail, ServiceError> {
        let db = &*self.db_pool;
        let pick_list = load_pick_list(db, pick_list_id).await?;
        let items = pick_list_items(db, pick_list_id).await?;
        Ok(PickListDetail { pick_list, items })
    }

    #[instrument(skip(self))]
    pub async fn assign_pick_list(
        &self,
        pick_list_id: Uuid,
        user_id: Uuid,
        actor: Uuid,
    ) -> Result<pick_list::Model, ServiceError> {
        let pick_list = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let pick_list = load_pick_list(txn, pick_list_id).await?;
                let next = pick_list.status.transition_to(WorkStatus::Assigned)?;
                let previous = pick_list.assigned_to;

                let mut active = pick_list.into_active_model();
                active.status = Set(next);
                active.assigned_to = Set(Some(user_id));
                active.updated_at = Set(Utc::now());
                let pick_list = active.update(txn).await?;

                AuditEntry::new("PICK_LIST_ASSIGNED", "pick_list", pick_list.id)
                    .by(actor)
                    .before(serde_json::json!({ "assigned_to": previous }))
                    .after(serde_json::json!({ "assigned_to": user_id }))
                    .insert(txn)
                    .await?;
                Ok(pick_list)
            })
        })
        .await?;

        self.notifier
            .notify(
                user_id,
                NotificationType::TaskAssigned,
                "Pick list assigned",
                format!(
                    "{} ({} item(s))",
                    pick_list.pick_list_number, pick_list.total_items
                ),
            )
            .await;
        Ok(pick_list)
    }

    /// Records a scan-validated pick for one pick list item.
    #[instrument(skip(self, request), fields(quantity = request.quantity_picked))]
    pub async fn pick_item(
        &self,
        pick_list_id: Uuid,
        item_id: Uuid,
        request: PickItemRequest,
        actor: Uuid,
    ) -> Result<PickOutcome, ServiceError> {
        request.validate()?;
        let item = pick_list_item::Entity::find_by_id(item_id)
            .filter(pick_list_item::Column::PickListId.eq(pick_list_id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Item {} not found on pick list {}",
                    item_id, pick_list_id
                ))
            })?;
        self.verify_scan(item.variant_id, item.location_id, &request.scanned_code)
            .await?;

        let picker = request.user_id.unwrap_or(actor);
        let quantity = request.quantity_picked;
        let scanned = normalize_code(&request.scanned_code);
        let notes = request.notes;

        let outcome = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let pick_list = load_pick_list(txn, pick_list_id).await?;
                if pick_list.status.is_terminal() {
                    return Err(ServiceError::Conflict(format!(
                        "Pick list {} is {}",
                        pick_list.pick_list_number, pick_list.status
                    )));
                }
                let item = pick_list_item::Entity::find_by_id(item_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))?;
                if item.status != WorkItemStatus::Pending {
                    return Err(ServiceError::Conflict(format!(
                        "Item {} is already {}",
                        item.id, item.status
                    )));
                }
                if quantity > item.quantity_to_pick {
                    return Err(ServiceError::ValidationError(format!(
                        "Cannot pick {} units; only {} required",
                        quantity, item.quantity_to_pick
                    )));
                }

                take_from_location(
                    txn,
                    item.variant_id,
                    item.location_id,
                    item.quantity_to_pick,
                    quantity,
                    PICK_LIST_SOURCE,
                    pick_list_id,
                    picker,
                )
                .await?;
                backorder_unpicked(
                    txn,
                    item.order_id,
                    Some(item.order_item_id),
                    item.variant_id,
                    item.quantity_to_pick - quantity,
                )
                .await?;

                let short = quantity < item.quantity_to_pick;
                let item_status = item.status.transition_to(if short {
                    WorkItemStatus::ShortPick
                } else {
                    WorkItemStatus::Completed
                })?;
                let now = Utc::now();
                let mut active = item.into_active_model();
                active.status = Set(item_status);
                active.quantity_picked = Set(quantity);
                active.picked_by = Set(Some(picker));
                active.picked_at = Set(Some(now));
                active.notes = Set(notes.clone());
                let item = active.update(txn).await?;

                record_event(
                    txn,
                    EventRecord {
                        source_type: PICK_LIST_SOURCE,
                        source_id: pick_list_id,
                        item_id: Some(item.id),
                        event_type: if short {
                            FulfillmentEventType::ItemShort
                        } else {
                            FulfillmentEventType::ItemPicked
                        },
                        user_id: picker,
                        scanned_code: Some(scanned),
                        quantity,
                        notes,
                    },
                )
                .await?;

                let items = pick_list_items(txn, pick_list_id).await?;
                let progress = summarize_items(
                    &items
                        .iter()
                        .map(|i| (i.order_id, i.status))
                        .collect::<Vec<_>>(),
                );
                let status = next_work_status(pick_list.status, &progress)?;
                let started_at = pick_list.started_at.unwrap_or(now);
                let mut active = pick_list.into_active_model();
                active.picked_items = Set(progress.finished_items);
                active.status = Set(status);
                active.started_at = Set(Some(started_at));
                active.updated_at = Set(now);
                if status == WorkStatus::Completed {
                    active.completed_at = Set(Some(now));
                }
                let pick_list = active.update(txn).await?;

                let mut orders_picked = Vec::new();
                if pick_list.status == WorkStatus::Completed {
                    record_event(
                        txn,
                        EventRecord {
                            source_type: PICK_LIST_SOURCE,
                            source_id: pick_list_id,
                            item_id: None,
                            event_type: FulfillmentEventType::ListCompleted,
                            user_id: picker,
                            scanned_code: None,
                            quantity: progress.finished_items,
                            notes: None,
                        },
                    )
                    .await?;
                    orders_picked = advance_orders(
                        txn,
                        &progress.finished_orders,
                        OrderStatus::Picking,
                        OrderStatus::Picked,
                        actor,
                        &format!("Picked on {}", pick_list.pick_list_number),
                    )
                    .await?;
                }

                AuditEntry::new("PICK_ITEM_PICKED", "pick_list_item", item.id)
                    .by(picker)
                    .before(serde_json::json!({ "status": WorkItemStatus::Pending }))
                    .after(serde_json::json!({
                        "status": item.status,
                        "quantity_picked": item.quantity_picked,
                    }))
                    .summary(format!(
                        "Picked {} of {}",
                        item.quantity_picked, item.quantity_to_pick
                    ))
                    .insert(txn)
                    .await?;

                Ok(PickOutcome {
                    pick_list,
                    item,
                    orders_picked,
                })
            })
        })
        .await?;

        let result = if outcome.item.status == WorkItemStatus::ShortPick {
            "short"
        } else {
            "completed"
        };
        PICKS.with_label_values(&["pick", result]).inc();
        self.event_sender
            .publish(Event::PickListItemPicked {
                pick_list_id,
                item_id,
                quantity,
            })
            .await;
        if outcome.pick_list.status == WorkStatus::Completed {
            info!(pick_list = %outcome.pick_list.pick_list_number, "pick list completed");
            self.event_sender
                .publish(Event::PickListCompleted(pick_list_id))
                .await;
        }
        self.publish_order_changes(&outcome.orders_picked, OrderStatus::Picking, OrderStatus::Picked)
            .await;
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn create_task(
        &self,
        task_type: TaskType,
        order_ids: Vec<Uuid>,
        actor: Uuid,
    ) -> Result<TaskDetail, ServiceError> {
        let detail = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move { create_task_in(txn, task_type, order_ids, actor).await })
        })
        .await?;

        info!(task = %detail.task.task_number, task_type = %task_type, "work task created");
        if task_type == TaskType::Picking {
            let orders: Vec<Uuid> = detail
                .items
                .iter()
                .map(|i| i.order_id)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            self.publish_order_changes(&orders, OrderStatus::Allocated, OrderStatus::Picking)
                .await;
        }
        Ok(detail)
    }

    #[instrument(skip(self))]
    pub async fn get_task(&self, task_id: Uuid) -> Result<TaskDetail, ServiceError> {
        let db = &*self.db_pool;
        let task = load_task(db, task_id).await?;
        let items = task_items(db, task_id).await?;
        Ok(TaskDetail { task, items })
    }

    #[instrument(skip(self))]
    pub async fn assign_task(
        &self,
        task_id: Uuid,
        user_id: Uuid,
        actor: Uuid,
    ) -> Result<work_task::Model, ServiceError> {
        let task = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let task = load_task(txn, task_id).await?;
                let next = task.status.transition_to(WorkStatus::Assigned)?;
                let previous = task.assigned_to;

                let mut active = task.into_active_model();
                active.status = Set(next);
                active.assigned_to = Set(Some(user_id));
                active.updated_at = Set(Utc::now());
                let task = active.update(txn).await?;

                AuditEntry::new("WORK_TASK_ASSIGNED", "work_task", task.id)
                    .by(actor)
                    .before(serde_json::json!({ "assigned_to": previous }))
                    .after(serde_json::json!({ "assigned_to": user_id }))
                    .insert(txn)
                    .await?;
                Ok(task)
            })
        })
        .await?;

        self.notifier
            .notify(
                user_id,
                NotificationType::TaskAssigned,
                "Task assigned",
                format!(
                    "{} task {} ({} item(s))",
                    task.task_type, task.task_number, task.total_items
                ),
            )
            .await;
        Ok(task)
    }

    /// Records a scan-validated completion of one task item.
    #[instrument(skip(self, request), fields(quantity = request.quantity))]
    pub async fn complete_task_item(
        &self,
        task_id: Uuid,
        item_id: Uuid,
        request: CompleteTaskItemRequest,
        actor: Uuid,
    ) -> Result<TaskItemOutcome, ServiceError> {
        request.validate()?;
        let item = task_item::Entity::find_by_id(item_id)
            .filter(task_item::Column::TaskId.eq(task_id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Item {} not found on task {}", item_id, task_id))
            })?;
        self.verify_scan(item.variant_id, item.location_id, &request.scanned_code)
            .await?;

        let quantity = request.quantity;
        let scanned = normalize_code(&request.scanned_code);
        let notes = request.notes;

        let outcome = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let task = load_task(txn, task_id).await?;
                if task.status.is_terminal() {
                    return Err(ServiceError::Conflict(format!(
                        "Task {} is {}",
                        task.task_number, task.status
                    )));
                }
                let item = task_item::Entity::find_by_id(item_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))?;
                if item.status != WorkItemStatus::Pending {
                    return Err(ServiceError::Conflict(format!(
                        "Item {} is already {}",
                        item.id, item.status
                    )));
                }
                if quantity > item.quantity_required {
                    return Err(ServiceError::ValidationError(format!(
                        "Cannot complete {} units; only {} required",
                        quantity, item.quantity_required
                    )));
                }

                if task.task_type == TaskType::Picking {
                    take_from_location(
                        txn,
                        item.variant_id,
                        item.location_id,
                        item.quantity_required,
                        quantity,
                        WORK_TASK_SOURCE,
                        task_id,
                        actor,
                    )
                    .await?;
                    backorder_unpicked(
                        txn,
                        item.order_id,
                        None,
                        item.variant_id,
                        item.quantity_required - quantity,
                    )
                    .await?;
                }

                let short = quantity < item.quantity_required;
                let item_status = item.status.transition_to(if short {
                    WorkItemStatus::ShortPick
                } else {
                    WorkItemStatus::Completed
                })?;
                let now = Utc::now();
                let mut active = item.into_active_model();
                active.status = Set(item_status);
                active.quantity_completed = Set(quantity);
                active.completed_by = Set(Some(actor));
                active.completed_at = Set(Some(now));
                active.notes = Set(notes.clone());
                let item = active.update(txn).await?;

                let event_type = match (task.task_type, short) {
                    (TaskType::Packing, _) => FulfillmentEventType::ItemPacked,
                    (TaskType::Picking, true) => FulfillmentEventType::ItemShort,
                    (TaskType::Picking, false) => FulfillmentEventType::ItemPicked,
                };
                record_event(
                    txn,
                    EventRecord {
                        source_type: WORK_TASK_SOURCE,
                        source_id: task_id,
                        item_id: Some(item.id),
                        event_type,
                        user_id: actor,
                        scanned_code: Some(scanned),
                        quantity,
                        notes,
                    },
                )
                .await?;

                let items = task_items(txn, task_id).await?;
                let progress = summarize_items(
                    &items
                        .iter()
                        .map(|i| (i.order_id, i.status))
                        .collect::<Vec<_>>(),
                );
                let status = next_work_status(task.status, &progress)?;
                let started_at = task.started_at.unwrap_or(now);
                let task_type = task.task_type;
                let mut active = task.into_active_model();
                active.completed_items = Set(progress.finished_items);
                active.total_orders = Set(progress.total_orders);
                active.completed_orders = Set(progress.completed_orders());
                active.status = Set(status);
                active.started_at = Set(Some(started_at));
                active.updated_at = Set(now);
                if status == WorkStatus::Completed {
                    active.completed_at = Set(Some(now));
                }
                let task = active.update(txn).await?;

                let (from, to) = match task_type {
                    TaskType::Picking => (OrderStatus::Picking, OrderStatus::Picked),
                    TaskType::Packing => (OrderStatus::Picked, OrderStatus::Packed),
                };
                let orders_advanced = advance_orders(
                    txn,
                    &progress.finished_orders,
                    from,
                    to,
                    actor,
                    &format!("{} on task {}", to, task.task_number),
                )
                .await?;

                if task.status == WorkStatus::Completed {
                    record_event(
                        txn,
                        EventRecord {
                            source_type: WORK_TASK_SOURCE,
                            source_id: task_id,
                            item_id: None,
                            event_type: FulfillmentEventType::TaskCompleted,
                            user_id: actor,
                            scanned_code: None,
                            quantity: progress.finished_items,
                            notes: None,
                        },
                    )
                    .await?;
                }

                AuditEntry::new("TASK_ITEM_COMPLETED", "task_item", item.id)
                    .by(actor)
                    .before(serde_json::json!({ "status": WorkItemStatus::Pending }))
                    .after(serde_json::json!({
                        "status": item.status,
                        "quantity_completed": item.quantity_completed,
                    }))
                    .insert(txn)
                    .await?;

                Ok(TaskItemOutcome {
                    task,
                    item,
                    orders_advanced,
                })
            })
        })
        .await?;

        let kind = match outcome.task.task_type {
            TaskType::Picking => "task_pick",
            TaskType::Packing => "task_pack",
        };
        let result = if outcome.item.status == WorkItemStatus::ShortPick {
            "short"
        } else {
            "completed"
        };
        PICKS.with_label_values(&[kind, result]).inc();

        if outcome.task.status == WorkStatus::Completed {
            info!(task = %outcome.task.task_number, "work task completed");
            self.event_sender
                .publish(Event::WorkTaskCompleted(task_id))
                .await;
        }
        let (from, to) = match outcome.task.task_type {
            TaskType::Picking => (OrderStatus::Picking, OrderStatus::Picked),
            TaskType::Packing => (OrderStatus::Picked, OrderStatus::Packed),
        };
        self.publish_order_changes(&outcome.orders_advanced, from, to)
            .await;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use crate::models::location::LocationType;

    fn variant() -> product_variant::Model {
        product_variant::Model {
            id: Uuid::new_v4(),
            sku: "WIDGET-BLUE".into(),
            upc: Some("012345678905".into()),
            barcode: None,
            name: "Blue widget".into(),
            price: Decimal::new(1000, 2),
            created_at: Utc::now(),
        }
    }

    fn location() -> location::Model {
        location::Model {
            id: Uuid::new_v4(),
            code: "A-01-01".into(),
            name: "Aisle A".into(),
            location_type: LocationType::Picking,
            barcode: Some("LOC-A0101".into()),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn scans_match_variant_and_location_codes() {
        let (v, l) = (variant(), location());
        assert!(scan_matches("widget-blue", &v, &l));
        assert!(scan_matches("  012345678905 ", &v, &l));
        assert!(scan_matches("loc-a0101", &v, &l));
        assert!(!scan_matches("WIDGET-RED", &v, &l));
        assert!(!scan_matches("   ", &v, &l));
    }

    #[test]
    fn progress_tracks_orders_with_all_items_finished() {
        let (a, b) = (Uuid::from_u128(1), Uuid::from_u128(2));
        let progress = summarize_items(&[
            (a, WorkItemStatus::Completed),
            (a, WorkItemStatus::ShortPick),
            (b, WorkItemStatus::Completed),
            (b, WorkItemStatus::Pending),
        ]);
        assert_eq!(progress.total_items, 4);
        assert_eq!(progress.finished_items, 3);
        assert_eq!(progress.total_orders, 2);
        assert_eq!(progress.finished_orders, vec![a]);
        assert!(!progress.all_finished());
    }

    #[test]
    fn work_status_progresses_through_in_progress() {
        let done = summarize_items(&[(Uuid::nil(), WorkItemStatus::Completed)]);
        let open = summarize_items(&[
            (Uuid::nil(), WorkItemStatus::Completed),
            (Uuid::nil(), WorkItemStatus::Pending),
        ]);
        assert_eq!(
            next_work_status(WorkStatus::Assigned, &open).unwrap(),
            WorkStatus::InProgress
        );
        assert_eq!(
            next_work_status(WorkStatus::Pending, &done).unwrap(),
            WorkStatus::Completed
        );
    }
}

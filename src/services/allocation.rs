//! Order allocation across locations.
//!
//! Planning is a pure function over the available stock per location; the
//! workflow then applies the plan with guarded reservations, so a plan made
//! from a stale read fails with a conflict instead of over-reserving.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::unit_of_work;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::{ALLOCATIONS, UNITS_RESERVED};
use crate::models::{
    backorder::{self, BackorderStatus},
    inventory_allocation,
    inventory_transaction::TransactionType,
    location,
    order::{self, OrderStatus},
    order_item, StatusTransition,
};
use crate::services::audit::{record_order_status, AuditEntry};
use crate::services::cycle_counts::{create_campaign_in, NewCampaign};
use crate::services::inventory::{append_ledger, reserve, rows_for_variant, LedgerEntry};

/// How an allocation treats lines that cannot be fully covered.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationMode {
    /// Any short line fails the whole allocation.
    #[default]
    Strict,
    /// Short remainders become backorders; the order is allocated.
    Backorder,
    /// Short lines trigger a cycle count; the order stays pending.
    Count,
}

/// Stock available for one variant at one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockSlot {
    pub inventory_id: Uuid,
    pub location_id: Uuid,
    pub available: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedReservation {
    pub inventory_id: Uuid,
    pub location_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinePlan {
    pub reservations: Vec<PlannedReservation>,
    pub shortfall: i32,
}

impl LinePlan {
    pub fn reserved(&self) -> i32 {
        self.reservations.iter().map(|r| r.quantity).sum()
    }
}

/// Greedy plan for `required` units: largest available first, ties broken
/// by location id.
pub fn plan_line(required: i32, slots: &[StockSlot]) -> LinePlan {
    let mut ordered: Vec<&StockSlot> = slots.iter().filter(|s| s.available > 0).collect();
    ordered.sort_by(|a, b| {
        b.available
            .cmp(&a.available)
            .then_with(|| a.location_id.cmp(&b.location_id))
    });

    let mut remaining = required.max(0);
    let mut reservations = Vec::new();
    for slot in ordered {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(slot.available);
        reservations.push(PlannedReservation {
            inventory_id: slot.inventory_id,
            location_id: slot.location_id,
            quantity: take,
        });
        remaining -= take;
    }

    LinePlan {
        reservations,
        shortfall: remaining,
    }
}

/// Removes a plan's reservations from the shared slots so later lines of
/// the same variant see what is left.
fn consume_slots(slots: &mut [StockSlot], plan: &LinePlan) {
    for reservation in &plan.reservations {
        if let Some(slot) = slots
            .iter_mut()
            .find(|s| s.inventory_id == reservation.inventory_id)
        {
            slot.available -= reservation.quantity;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Shortage {
    pub order_item_id: Uuid,
    pub variant_id: Uuid,
    pub required: i32,
    pub allocated: i32,
    pub short: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocationOutcome {
    pub order_id: Uuid,
    pub mode: AllocationMode,
    pub previous_status: OrderStatus,
    pub status: OrderStatus,
    pub allocated_units: i32,
    pub locations: usize,
    pub allocations: Vec<inventory_allocation::Model>,
    pub shortages: Vec<Shortage>,
    pub backorder_ids: Vec<Uuid>,
    pub cycle_count_campaign_id: Option<Uuid>,
    pub summary: String,
}

pub fn allocation_summary(units: i32, locations: usize) -> String {
    format!("Allocated {} units across {} location(s)", units, locations)
}

async fn active_location_ids<C: ConnectionTrait>(conn: &C) -> Result<HashSet<Uuid>, ServiceError> {
    Ok(location::Entity::find()
        .filter(location::Column::IsActive.eq(true))
        .all(conn)
        .await?
        .into_iter()
        .map(|l| l.id)
        .collect())
}

/// Allocates a PENDING order inside the caller's unit of work.
pub async fn allocate_in<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    mode: AllocationMode,
    actor: Uuid,
    count_tolerance: Decimal,
) -> Result<AllocationOutcome, ServiceError> {
    let order = order::Entity::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
    if order.status != OrderStatus::Pending {
        return Err(ServiceError::Conflict(format!(
            "Order {} is {}; only PENDING orders can be allocated",
            order.order_number, order.status
        )));
    }

    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::CreatedAt)
        .order_by_asc(order_item::Column::Id)
        .all(conn)
        .await?;

    let active_locations = active_location_ids(conn).await?;
    let mut stock: HashMap<Uuid, Vec<StockSlot>> = HashMap::new();
    let mut plans: Vec<(order_item::Model, LinePlan)> = Vec::new();

    for item in items.into_iter().filter(|i| i.remaining() > 0) {
        if !stock.contains_key(&item.variant_id) {
            let slots = rows_for_variant(conn, item.variant_id)
                .await?
                .into_iter()
                .filter(|row| active_locations.contains(&row.location_id))
                .map(|row| StockSlot {
                    inventory_id: row.id,
                    location_id: row.location_id,
                    available: row.available(),
                })
                .collect();
            stock.insert(item.variant_id, slots);
        }
        let slots = stock.entry(item.variant_id).or_default();
        let plan = plan_line(item.remaining(), slots);
        consume_slots(slots, &plan);
        plans.push((item, plan));
    }

    let shortages: Vec<Shortage> = plans
        .iter()
        .filter(|(_, plan)| plan.shortfall > 0)
        .map(|(item, plan)| Shortage {
            order_item_id: item.id,
            variant_id: item.variant_id,
            required: item.remaining(),
            allocated: if mode == AllocationMode::Count {
                0
            } else {
                plan.reserved()
            },
            short: if mode == AllocationMode::Count {
                item.remaining()
            } else {
                plan.shortfall
            },
        })
        .collect();

    if mode == AllocationMode::Strict && !shortages.is_empty() {
        let detail = shortages
            .iter()
            .map(|s| format!("variant {} short by {}", s.variant_id, s.short))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ServiceError::InsufficientStock(format!(
            "Order {}: {}",
            order.order_number, detail
        )));
    }

    let now = Utc::now();
    let mut allocations = Vec::new();
    let mut backorder_ids = Vec::new();
    let mut locations = BTreeSet::new();
    let mut allocated_units = 0;

    for (item, plan) in &plans {
        if mode == AllocationMode::Count && plan.shortfall > 0 {
            continue;
        }

        for reservation in &plan.reservations {
            reserve(conn, reservation.inventory_id, reservation.quantity).await?;
            let allocation = inventory_allocation::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                order_item_id: Set(item.id),
                variant_id: Set(item.variant_id),
                location_id: Set(reservation.location_id),
                quantity: Set(reservation.quantity),
                created_at: Set(now),
            }
            .insert(conn)
            .await?;
            append_ledger(
                conn,
                LedgerEntry {
                    variant_id: item.variant_id,
                    location_id: reservation.location_id,
                    transaction_type: TransactionType::Allocation,
                    quantity_change: reservation.quantity,
                    reference_type: "ORDER",
                    reference_id: Some(order_id),
                    user_id: Some(actor),
                    notes: Some(format!("Reserved for order {}", order.order_number)),
                },
            )
            .await?;
            locations.insert(reservation.location_id);
            allocated_units += reservation.quantity;
            allocations.push(allocation);
        }

        let reserved = plan.reserved();
        if reserved > 0 {
            let mut active = item.clone().into_active_model();
            active.quantity_allocated = Set(item.quantity_allocated + reserved);
            active.update(conn).await?;
        }

        if mode == AllocationMode::Backorder && plan.shortfall > 0 {
            let row = backorder::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                order_item_id: Set(item.id),
                variant_id: Set(item.variant_id),
                quantity_short: Set(plan.shortfall),
                status: Set(BackorderStatus::Pending),
                created_at: Set(now),
            }
            .insert(conn)
            .await?;
            backorder_ids.push(row.id);
        }
    }

    let mut cycle_count_campaign_id = None;
    if mode == AllocationMode::Count && !shortages.is_empty() {
        let short_variants: Vec<Uuid> = shortages
            .iter()
            .map(|s| s.variant_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let campaign = create_campaign_in(
            conn,
            NewCampaign {
                name: format!("Shortage count for order {}", order.order_number),
                tolerance_percentage: count_tolerance,
                location_ids: None,
                variant_ids: Some(short_variants),
                assigned_to: None,
                source_order_id: Some(order_id),
                created_by: Some(actor),
            },
        )
        .await?;
        cycle_count_campaign_id = campaign.map(|c| c.campaign.id);
    }

    let previous_status = order.status;
    let status = if mode == AllocationMode::Count && !shortages.is_empty() {
        previous_status
    } else {
        previous_status.transition_to(OrderStatus::Allocated)?
    };
    let summary = allocation_summary(allocated_units, locations.len());

    if status != previous_status {
        let mut active = order.clone().into_active_model();
        active.status = Set(status);
        active.updated_at = Set(now);
        active.update(conn).await?;
        record_order_status(
            conn,
            order_id,
            Some(previous_status),
            status,
            Some(actor),
            Some(summary.clone()),
        )
        .await?;
    }

    AuditEntry::new("ORDER_ALLOCATED", "order", order_id)
        .by(actor)
        .before(serde_json::json!({ "status": previous_status }))
        .after(serde_json::json!({
            "status": status,
            "mode": mode,
            "allocated_units": allocated_units,
            "short_lines": shortages.len(),
            "cycle_count_campaign_id": cycle_count_campaign_id,
        }))
        .summary(summary.clone())
        .insert(conn)
        .await?;

    Ok(AllocationOutcome {
        order_id,
        mode,
        previous_status,
        status,
        allocated_units,
        locations: locations.len(),
        allocations,
        shortages,
        backorder_ids,
        cycle_count_campaign_id,
        summary,
    })
}

/// Allocation entry point used by the order actions.
#[derive(Clone)]
pub struct AllocationService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
    count_tolerance: Decimal,
}

impl AllocationService {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: EventSender,
        count_tolerance: Decimal,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            count_tolerance,
        }
    }

    /// Allocates one order in its own unit of work.
    #[instrument(skip(self))]
    pub async fn allocate(
        &self,
        order_id: Uuid,
        mode: AllocationMode,
        actor: Uuid,
    ) -> Result<AllocationOutcome, ServiceError> {
        let tolerance = self.count_tolerance;
        let result = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move { allocate_in(txn, order_id, mode, actor, tolerance).await })
        })
        .await;

        let mode_label = mode.to_string();
        match result {
            Ok(outcome) => {
                let label = if outcome.shortages.is_empty() {
                    "allocated"
                } else {
                    "partial"
                };
                ALLOCATIONS.with_label_values(&[&mode_label, label]).inc();
                UNITS_RESERVED.inc_by(outcome.allocated_units.max(0) as u64);
                self.publish(&outcome).await;
                Ok(outcome)
            }
            Err(e) => {
                let label = match &e {
                    ServiceError::InsufficientStock(_) => "insufficient",
                    ServiceError::Conflict(_) => "conflict",
                    _ => "error",
                };
                ALLOCATIONS.with_label_values(&[&mode_label, label]).inc();
                warn!(%order_id, error = %e, "allocation failed");
                Err(e)
            }
        }
    }

    async fn publish(&self, outcome: &AllocationOutcome) {
        info!(
            order_id = %outcome.order_id,
            mode = %outcome.mode,
            units = outcome.allocated_units,
            short_lines = outcome.shortages.len(),
            "{}",
            outcome.summary
        );
        self.event_sender
            .publish(Event::OrderAllocated {
                order_id: outcome.order_id,
                mode: outcome.mode.to_string(),
                units: outcome.allocated_units,
                locations: outcome.locations,
                short_lines: outcome.shortages.len(),
            })
            .await;
        if outcome.status != outcome.previous_status {
            self.event_sender
                .publish(Event::OrderStatusChanged {
                    order_id: outcome.order_id,
                    old_status: outcome.previous_status.to_string(),
                    new_status: outcome.status.to_string(),
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn slot(location: u128, available: i32) -> StockSlot {
        StockSlot {
            inventory_id: Uuid::from_u128(location + 1000),
            location_id: Uuid::from_u128(location),
            available,
        }
    }

    #[test]
    fn takes_largest_location_first() {
        let plan = plan_line(12, &[slot(1, 5), slot(2, 10), slot(3, 4)]);
        assert_eq!(plan.shortfall, 0);
        assert_eq!(plan.reservations.len(), 2);
        assert_eq!(plan.reservations[0].location_id, Uuid::from_u128(2));
        assert_eq!(plan.reservations[0].quantity, 10);
        assert_eq!(plan.reservations[1].location_id, Uuid::from_u128(1));
        assert_eq!(plan.reservations[1].quantity, 2);
    }

    #[test]
    fn ties_break_by_location_id() {
        let plan = plan_line(3, &[slot(9, 3), slot(4, 3)]);
        assert_eq!(plan.reservations[0].location_id, Uuid::from_u128(4));
    }

    #[test]
    fn reports_shortfall_and_skips_empty_slots() {
        let plan = plan_line(10, &[slot(1, 0), slot(2, -3), slot(3, 4)]);
        assert_eq!(plan.reserved(), 4);
        assert_eq!(plan.shortfall, 6);
        assert_eq!(plan.reservations.len(), 1);
    }

    #[test]
    fn lines_of_one_variant_share_stock() {
        let mut slots = vec![slot(1, 5)];
        let first = plan_line(3, &slots);
        consume_slots(&mut slots, &first);
        let second = plan_line(3, &slots);
        assert_eq!(second.reserved(), 2);
        assert_eq!(second.shortfall, 1);
    }

    #[test]
    fn summary_wording() {
        assert_eq!(
            allocation_summary(7, 2),
            "Allocated 7 units across 2 location(s)"
        );
    }

    proptest! {
        #[test]
        fn plan_never_overdraws(
            required in 0i32..500,
            availability in prop::collection::vec(-5i32..100, 0..8)
        ) {
            let slots: Vec<_> = availability
                .iter()
                .enumerate()
                .map(|(i, a)| slot(i as u128, *a))
                .collect();
            let plan = plan_line(required, &slots);
            let total_available: i32 = slots.iter().map(|s| s.available.max(0)).sum();

            prop_assert_eq!(plan.reserved() + plan.shortfall, required);
            prop_assert_eq!(plan.reserved(), required.min(total_available));
            for r in &plan.reservations {
                let s = slots.iter().find(|s| s.inventory_id == r.inventory_id).unwrap();
                prop_assert!(r.quantity > 0 && r.quantity <= s.available);
            }
        }
    }
}

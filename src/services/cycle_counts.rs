//! Cycle count campaigns: creation, count recording, recount escalation,
//! variance approval and campaign completion.
//!
//! Campaign counters are never incremented in place. After every task change
//! they are recomputed from the child tasks by [`summarize_campaign`].

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::unit_of_work;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::CYCLE_COUNTS;
use crate::models::{
    cycle_count_campaign::{self, CampaignStatus},
    cycle_count_task::{self, CountTaskStatus},
    inventory,
    inventory_transaction::TransactionType,
    StatusTransition,
};
use crate::notifications::{NotificationType, Notifier};
use crate::services::audit::AuditEntry;
use crate::services::inventory::{
    adjust_on_hand, append_ledger, find_or_create_row, find_row, LedgerEntry,
};

/// Result of comparing a counted quantity with the system snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountEvaluation {
    pub variance: i32,
    /// `|variance| / system * 100`, two decimal places; `None` when system is 0.
    pub variance_percentage: Option<Decimal>,
    pub within_tolerance: bool,
}

pub fn evaluate_count(system: i32, counted: i32, tolerance: Decimal) -> CountEvaluation {
    let variance = counted - system;
    if system == 0 {
        return CountEvaluation {
            variance,
            variance_percentage: None,
            within_tolerance: variance == 0,
        };
    }

    let pct = Decimal::from(variance.abs()) * Decimal::ONE_HUNDRED / Decimal::from(system.abs());
    CountEvaluation {
        variance,
        variance_percentage: Some(pct.round_dp(2)),
        within_tolerance: pct <= tolerance,
    }
}

/// Whether applying `variance` to `row` keeps its reservations covered.
pub fn variance_covers_reservations(row: Option<&inventory::Model>, variance: i32) -> bool {
    match row {
        Some(row) => row.quantity_on_hand + variance >= row.quantity_reserved,
        None => variance >= 0,
    }
}

/// Counters derived from a campaign's tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CampaignRollup {
    pub total_tasks: i32,
    /// Tasks in COMPLETED, SKIPPED or CANCELLED.
    pub completed_tasks: i32,
    /// Tasks whose recorded variance is non-zero.
    pub variances_found: i32,
    /// Tasks not yet closed, including those awaiting review.
    pub active_tasks: i32,
}

impl CampaignRollup {
    pub fn is_complete(&self) -> bool {
        self.total_tasks > 0 && self.completed_tasks == self.total_tasks && self.active_tasks == 0
    }
}

pub fn summarize_campaign(tasks: &[cycle_count_task::Model]) -> CampaignRollup {
    tasks.iter().fold(CampaignRollup::default(), |mut acc, task| {
        acc.total_tasks += 1;
        if task.status.is_closed() {
            acc.completed_tasks += 1;
        } else {
            acc.active_tasks += 1;
        }
        if task.variance.map_or(false, |v| v != 0) {
            acc.variances_found += 1;
        }
        acc
    })
}

/// Inputs for creating a campaign inside an existing unit of work.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub name: String,
    pub tolerance_percentage: Decimal,
    /// Restrict tasks to these locations; `None` means every location.
    pub location_ids: Option<Vec<Uuid>>,
    /// Restrict tasks to these variants; `None` means every variant.
    pub variant_ids: Option<Vec<Uuid>>,
    pub assigned_to: Option<Uuid>,
    pub source_order_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
}

/// Creates a PLANNED campaign with one task per matching inventory row,
/// snapshotting each row's on-hand quantity. Returns `None` when no
/// inventory row matches, in which case nothing is written.
pub async fn create_campaign_in<C: ConnectionTrait>(
    conn: &C,
    plan: NewCampaign,
) -> Result<Option<CampaignDetail>, ServiceError> {
    let mut select = inventory::Entity::find();
    if let Some(location_ids) = &plan.location_ids {
        select = select.filter(inventory::Column::LocationId.is_in(location_ids.clone()));
    }
    if let Some(variant_ids) = &plan.variant_ids {
        select = select.filter(inventory::Column::VariantId.is_in(variant_ids.clone()));
    }
    let rows = select
        .order_by_asc(inventory::Column::LocationId)
        .order_by_asc(inventory::Column::VariantId)
        .all(conn)
        .await?;

    if rows.is_empty() {
        return Ok(None);
    }

    let now = Utc::now();
    let campaign = cycle_count_campaign::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(plan.name),
        status: Set(CampaignStatus::Planned),
        tolerance_percentage: Set(plan.tolerance_percentage),
        total_tasks: Set(rows.len() as i32),
        completed_tasks: Set(0),
        variances_found: Set(0),
        source_order_id: Set(plan.source_order_id),
        created_by: Set(plan.created_by),
        created_at: Set(now),
        updated_at: Set(now),
        completed_at: Set(None),
    }
    .insert(conn)
    .await?;

    let initial_status = if plan.assigned_to.is_some() {
        CountTaskStatus::Assigned
    } else {
        CountTaskStatus::Pending
    };

    let mut tasks = Vec::with_capacity(rows.len());
    for row in rows {
        let task = cycle_count_task::ActiveModel {
            id: Set(Uuid::new_v4()),
            campaign_id: Set(campaign.id),
            variant_id: Set(row.variant_id),
            location_id: Set(row.location_id),
            system_quantity: Set(row.quantity_on_hand),
            counted_quantity: Set(None),
            variance: Set(None),
            variance_percentage: Set(None),
            tolerance_percentage: Set(plan.tolerance_percentage),
            status: Set(initial_status),
            requires_recount: Set(false),
            assigned_to: Set(plan.assigned_to),
            counted_by: Set(None),
            counted_at: Set(None),
            notes: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;
        tasks.push(task);
    }

    AuditEntry::new("CYCLE_COUNT_CAMPAIGN_CREATED", "cycle_count_campaign", campaign.id)
        .after(serde_json::json!({ "total_tasks": campaign.total_tasks }))
        .summary(format!("Created campaign with {} task(s)", campaign.total_tasks))
        .insert(conn)
        .await?;

    Ok(Some(CampaignDetail { campaign, tasks }))
}

async fn load_campaign<C: ConnectionTrait>(
    conn: &C,
    campaign_id: Uuid,
) -> Result<cycle_count_campaign::Model, ServiceError> {
    cycle_count_campaign::Entity::find_by_id(campaign_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Cycle count {} not found", campaign_id)))
}

async fn load_open_campaign<C: ConnectionTrait>(
    conn: &C,
    campaign_id: Uuid,
) -> Result<cycle_count_campaign::Model, ServiceError> {
    let campaign = load_campaign(conn, campaign_id).await?;
    if campaign.status.is_terminal() {
        return Err(ServiceError::Conflict(format!(
            "Cycle count {} is {}",
            campaign.id, campaign.status
        )));
    }
    Ok(campaign)
}

async fn load_task<C: ConnectionTrait>(
    conn: &C,
    campaign_id: Uuid,
    task_id: Uuid,
) -> Result<cycle_count_task::Model, ServiceError> {
    cycle_count_task::Entity::find_by_id(task_id)
        .filter(cycle_count_task::Column::CampaignId.eq(campaign_id))
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "Task {} not found in cycle count {}",
                task_id, campaign_id
            ))
        })
}

async fn campaign_tasks<C: ConnectionTrait>(
    conn: &C,
    campaign_id: Uuid,
) -> Result<Vec<cycle_count_task::Model>, ServiceError> {
    Ok(cycle_count_task::Entity::find()
        .filter(cycle_count_task::Column::CampaignId.eq(campaign_id))
        .order_by_asc(cycle_count_task::Column::CreatedAt)
        .order_by_asc(cycle_count_task::Column::Id)
        .all(conn)
        .await?)
}

/// Writes the recomputed counters; completes the campaign when every task
/// is closed and `auto_complete` is set.
async fn apply_rollup<C: ConnectionTrait>(
    conn: &C,
    campaign: cycle_count_campaign::Model,
    auto_complete: bool,
) -> Result<cycle_count_campaign::Model, ServiceError> {
    let tasks = campaign_tasks(conn, campaign.id).await?;
    let rollup = summarize_campaign(&tasks);
    let current = campaign.status;
    let now = Utc::now();

    let mut active = campaign.into_active_model();
    active.total_tasks = Set(rollup.total_tasks);
    active.completed_tasks = Set(rollup.completed_tasks);
    active.variances_found = Set(rollup.variances_found);
    active.updated_at = Set(now);

    if current == CampaignStatus::Planned {
        active.status = Set(current.transition_to(CampaignStatus::Active)?);
    }
    if auto_complete && rollup.is_complete() {
        active.status = Set(current.transition_to(CampaignStatus::Completed)?);
        active.completed_at = Set(Some(now));
    }

    Ok(active.update(conn).await?)
}

/// Applies a task's variance to on-hand with a COUNT ledger entry.
async fn apply_variance<C: ConnectionTrait>(
    conn: &C,
    task: &cycle_count_task::Model,
    variance: i32,
    actor: Uuid,
) -> Result<(), ServiceError> {
    if variance == 0 {
        return Ok(());
    }
    let row = find_or_create_row(conn, task.variant_id, task.location_id).await?;
    adjust_on_hand(conn, row.id, variance).await?;
    append_ledger(
        conn,
        LedgerEntry {
            variant_id: task.variant_id,
            location_id: task.location_id,
            transaction_type: TransactionType::Count,
            quantity_change: variance,
            reference_type: "CYCLE_COUNT",
            reference_id: Some(task.campaign_id),
            user_id: Some(actor),
            notes: task.notes.clone(),
        },
    )
    .await?;
    Ok(())
}

fn task_snapshot(task: &cycle_count_task::Model) -> serde_json::Value {
    serde_json::json!({
        "status": task.status,
        "system_quantity": task.system_quantity,
        "counted_quantity": task.counted_quantity,
        "variance": task.variance,
        "variance_percentage": task.variance_percentage,
        "assigned_to": task.assigned_to,
    })
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCycleCountRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, message = "At least one location is required"))]
    pub location_ids: Vec<Uuid>,
    pub variant_ids: Option<Vec<Uuid>>,
    #[schema(value_type = Option<f64>)]
    pub tolerance_percentage: Option<Decimal>,
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordCountRequest {
    pub item_id: Uuid,
    #[validate(range(min = 0, message = "Counted quantity cannot be negative"))]
    pub counted_quantity: Option<i32>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    /// `SKIPPED` skips the task; absent or `COMPLETED` records a count.
    pub status: Option<CountTaskStatus>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecountRequest {
    pub assign_to: Uuid,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignDetail {
    pub campaign: cycle_count_campaign::Model,
    pub tasks: Vec<cycle_count_task::Model>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordCountOutcome {
    pub task: cycle_count_task::Model,
    pub campaign: cycle_count_campaign::Model,
    pub within_tolerance: bool,
}

/// Service for cycle count campaigns.
#[derive(Clone)]
pub struct CycleCountService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
    notifier: Notifier,
    default_tolerance: Decimal,
}

impl CycleCountService {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: EventSender,
        notifier: Notifier,
        default_tolerance: Decimal,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            notifier,
            default_tolerance,
        }
    }

    #[instrument(skip(self, request))]
    pub async fn create_campaign(
        &self,
        request: CreateCycleCountRequest,
        actor: Uuid,
    ) -> Result<CampaignDetail, ServiceError> {
        request.validate()?;
        let tolerance = request.tolerance_percentage.unwrap_or(self.default_tolerance);
        if tolerance < Decimal::ZERO || tolerance > Decimal::ONE_HUNDRED {
            return Err(ServiceError::ValidationError(
                "Tolerance percentage must be between 0 and 100".into(),
            ));
        }

        let assignee = request.assigned_to;
        let plan = NewCampaign {
            name: request.name,
            tolerance_percentage: tolerance,
            location_ids: Some(request.location_ids),
            variant_ids: request.variant_ids,
            assigned_to: assignee,
            source_order_id: None,
            created_by: Some(actor),
        };

        let detail = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                create_campaign_in(txn, plan).await?.ok_or_else(|| {
                    ServiceError::ValidationError(
                        "No inventory found for the selected locations".into(),
                    )
                })
            })
        })
        .await?;

        info!(campaign_id = %detail.campaign.id, tasks = detail.tasks.len(), "cycle count created");
        if let Some(user_id) = assignee {
            self.notifier
                .notify(
                    user_id,
                    NotificationType::TaskAssigned,
                    "Cycle count assigned",
                    format!("{} ({} task(s))", detail.campaign.name, detail.tasks.len()),
                )
                .await;
        }
        Ok(detail)
    }

    #[instrument(skip(self))]
    pub async fn get_campaign(&self, campaign_id: Uuid) -> Result<CampaignDetail, ServiceError> {
        let db = &*self.db_pool;
        let campaign = load_campaign(db, campaign_id).await?;
        let tasks = campaign_tasks(db, campaign_id).await?;
        Ok(CampaignDetail { campaign, tasks })
    }

    /// Records a count (or a skip) for one task and recomputes the campaign.
    #[instrument(skip(self, request), fields(task_id = %request.item_id))]
    pub async fn record_count(
        &self,
        campaign_id: Uuid,
        request: RecordCountRequest,
        actor: Uuid,
    ) -> Result<RecordCountOutcome, ServiceError> {
        request.validate()?;
        let skip = match request.status {
            Some(CountTaskStatus::Skipped) => true,
            None | Some(CountTaskStatus::Completed) => false,
            Some(other) => {
                return Err(ServiceError::ValidationError(format!(
                    "Status {} cannot be submitted with a count",
                    other
                )))
            }
        };
        let counted = match (skip, request.counted_quantity) {
            (true, _) => None,
            (false, Some(q)) => Some(q),
            (false, None) => {
                return Err(ServiceError::ValidationError(
                    "countedQuantity is required".into(),
                ))
            }
        };
        let task_id = request.item_id;
        let notes = request.notes;

        let outcome = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let campaign = load_open_campaign(txn, campaign_id).await?;
                let task = load_task(txn, campaign_id, task_id).await?;

                if task.status.is_terminal() {
                    return Err(ServiceError::Conflict(format!(
                        "Task {} is already {}",
                        task.id, task.status
                    )));
                }
                if task.status == CountTaskStatus::VarianceReview {
                    return Err(ServiceError::Conflict(format!(
                        "Task {} is awaiting variance review",
                        task.id
                    )));
                }

                let before = task_snapshot(&task);
                let now = Utc::now();
                let current = task.status;
                let mut within_tolerance = false;
                let mut active = task.clone().into_active_model();
                active.counted_by = Set(Some(actor));
                active.counted_at = Set(Some(now));
                active.updated_at = Set(now);
                if notes.is_some() {
                    active.notes = Set(notes.clone());
                }

                match counted {
                    None => {
                        active.status = Set(current.transition_to(CountTaskStatus::Skipped)?);
                        active.requires_recount = Set(false);
                    }
                    Some(counted) => {
                        let eval =
                            evaluate_count(task.system_quantity, counted, task.tolerance_percentage);
                        within_tolerance = eval.within_tolerance;
                        active.counted_quantity = Set(Some(counted));
                        active.variance = Set(Some(eval.variance));
                        active.variance_percentage = Set(eval.variance_percentage);

                        // A shrink that would strand reserved units goes to review
                        // instead of being applied.
                        let covered = eval.variance >= 0
                            || variance_covers_reservations(
                                find_row(txn, task.variant_id, task.location_id)
                                    .await?
                                    .as_ref(),
                                eval.variance,
                            );
                        if eval.within_tolerance && !covered {
                            warn!(
                                task_id = %task.id,
                                variance = eval.variance,
                                "count within tolerance would leave reservations uncovered; holding for review"
                            );
                        }

                        if eval.within_tolerance && covered {
                            let mut counted_task = task.clone();
                            counted_task.notes = notes.clone().or(task.notes.clone());
                            apply_variance(txn, &counted_task, eval.variance, actor).await?;
                            active.status = Set(current.transition_to(CountTaskStatus::Completed)?);
                            active.requires_recount = Set(false);
                        } else {
                            active.status =
                                Set(current.transition_to(CountTaskStatus::VarianceReview)?);
                            active.requires_recount = Set(true);
                        }
                    }
                }

                let task = active.update(txn).await?;
                AuditEntry::new("CYCLE_COUNT_RECORDED", "cycle_count_task", task.id)
                    .by(actor)
                    .before(before)
                    .after(task_snapshot(&task))
                    .summary(format!("Count recorded, task is {}", task.status))
                    .insert(txn)
                    .await?;

                let campaign = apply_rollup(txn, campaign, true).await?;
                Ok(RecordCountOutcome {
                    task,
                    campaign,
                    within_tolerance,
                })
            })
        })
        .await?;

        let status = outcome.task.status.to_string();
        CYCLE_COUNTS.with_label_values(&[&status]).inc();
        if outcome.task.status == CountTaskStatus::VarianceReview {
            warn!(
                variance = ?outcome.task.variance,
                variance_percentage = ?outcome.task.variance_percentage,
                "count outside tolerance; awaiting review"
            );
        }
        self.event_sender
            .publish(Event::CycleCountRecorded {
                campaign_id,
                task_id,
                status,
            })
            .await;
        if outcome.campaign.status == CampaignStatus::Completed {
            self.event_sender
                .publish(Event::CampaignCompleted(campaign_id))
                .await;
        }
        Ok(outcome)
    }

    /// Sends a task back for recount by another counter. Inventory is untouched.
    #[instrument(skip(self, request))]
    pub async fn escalate_recount(
        &self,
        campaign_id: Uuid,
        task_id: Uuid,
        request: RecountRequest,
        actor: Uuid,
    ) -> Result<cycle_count_task::Model, ServiceError> {
        request.validate()?;
        let assignee = request.assign_to;
        let notes = request.notes;

        let task = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let campaign = load_open_campaign(txn, campaign_id).await?;
                let task = load_task(txn, campaign_id, task_id).await?;
                let next = task.status.transition_to(CountTaskStatus::RecountRequired)?;
                let before = task_snapshot(&task);

                let mut active = task.into_active_model();
                active.status = Set(next);
                active.requires_recount = Set(true);
                active.assigned_to = Set(Some(assignee));
                active.counted_quantity = Set(None);
                active.variance = Set(None);
                active.variance_percentage = Set(None);
                active.counted_by = Set(None);
                active.counted_at = Set(None);
                active.updated_at = Set(Utc::now());
                if notes.is_some() {
                    active.notes = Set(notes);
                }
                let task = active.update(txn).await?;

                AuditEntry::new("CYCLE_COUNT_RECOUNT_REQUESTED", "cycle_count_task", task.id)
                    .by(actor)
                    .before(before)
                    .after(task_snapshot(&task))
                    .summary(format!("Recount assigned to {}", assignee))
                    .insert(txn)
                    .await?;

                apply_rollup(txn, campaign, false).await?;
                Ok(task)
            })
        })
        .await?;

        self.notifier
            .notify(
                assignee,
                NotificationType::RecountRequested,
                "Recount requested",
                format!("Cycle count task {} needs a recount", task.id),
            )
            .await;
        self.event_sender
            .publish(Event::RecountRequested {
                campaign_id,
                task_id,
            })
            .await;
        Ok(task)
    }

    /// Accepts a count held for review and applies its variance.
    #[instrument(skip(self))]
    pub async fn approve_variance(
        &self,
        campaign_id: Uuid,
        task_id: Uuid,
        actor: Uuid,
    ) -> Result<RecordCountOutcome, ServiceError> {
        let outcome = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let campaign = load_open_campaign(txn, campaign_id).await?;
                let task = load_task(txn, campaign_id, task_id).await?;
                if task.status != CountTaskStatus::VarianceReview {
                    return Err(ServiceError::Conflict(format!(
                        "Task {} is {}, not in variance review",
                        task.id, task.status
                    )));
                }
                let variance = task.variance.unwrap_or(0);
                let before = task_snapshot(&task);
                apply_variance(txn, &task, variance, actor).await?;

                let next = task.status.transition_to(CountTaskStatus::Completed)?;
                let mut active = task.into_active_model();
                active.status = Set(next);
                active.requires_recount = Set(false);
                active.updated_at = Set(Utc::now());
                let task = active.update(txn).await?;

                AuditEntry::new("CYCLE_COUNT_VARIANCE_APPROVED", "cycle_count_task", task.id)
                    .by(actor)
                    .before(before)
                    .after(task_snapshot(&task))
                    .summary(format!("Variance of {} approved", variance))
                    .insert(txn)
                    .await?;

                let campaign = apply_rollup(txn, campaign, true).await?;
                Ok(RecordCountOutcome {
                    task,
                    campaign,
                    within_tolerance: false,
                })
            })
        })
        .await?;

        CYCLE_COUNTS.with_label_values(&["VARIANCE_APPROVED"]).inc();
        if outcome.campaign.status == CampaignStatus::Completed {
            self.event_sender
                .publish(Event::CampaignCompleted(campaign_id))
                .await;
        }
        Ok(outcome)
    }

    /// Completes a campaign whose tasks are all closed.
    #[instrument(skip(self))]
    pub async fn complete_campaign(
        &self,
        campaign_id: Uuid,
        actor: Uuid,
    ) -> Result<cycle_count_campaign::Model, ServiceError> {
        let campaign = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let campaign = load_campaign(txn, campaign_id).await?;
                if campaign.status == CampaignStatus::Completed {
                    return Err(ServiceError::Conflict("Campaign already completed".into()));
                }
                let next = campaign.status.transition_to(CampaignStatus::Completed)?;

                let tasks = campaign_tasks(txn, campaign_id).await?;
                let rollup = summarize_campaign(&tasks);
                if rollup.active_tasks > 0 {
                    return Err(ServiceError::Conflict(format!(
                        "{} task(s) are still active",
                        rollup.active_tasks
                    )));
                }

                let before = serde_json::json!({ "status": campaign.status });
                let now = Utc::now();
                let mut active = campaign.into_active_model();
                active.status = Set(next);
                active.total_tasks = Set(rollup.total_tasks);
                active.completed_tasks = Set(rollup.completed_tasks);
                active.variances_found = Set(rollup.variances_found);
                active.completed_at = Set(Some(now));
                active.updated_at = Set(now);
                let campaign = active.update(txn).await?;

                AuditEntry::new("CYCLE_COUNT_COMPLETED", "cycle_count_campaign", campaign.id)
                    .by(actor)
                    .before(before)
                    .after(serde_json::json!({
                        "status": campaign.status,
                        "completed_tasks": campaign.completed_tasks,
                        "variances_found": campaign.variances_found,
                    }))
                    .summary(format!(
                        "Completed with {} variance(s)",
                        campaign.variances_found
                    ))
                    .insert(txn)
                    .await?;
                Ok(campaign)
            })
        })
        .await?;

        info!(%campaign_id, variances = campaign.variances_found, "cycle count completed");
        self.event_sender
            .publish(Event::CampaignCompleted(campaign_id))
            .await;
        Ok(campaign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn task(status: CountTaskStatus, variance: Option<i32>) -> cycle_count_task::Model {
        let now = Utc::now();
        cycle_count_task::Model {
            id: Uuid::new_v4(),
            campaign_id: Uuid::nil(),
            variant_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            system_quantity: 10,
            counted_quantity: variance.map(|v| 10 + v),
            variance,
            variance_percentage: None,
            tolerance_percentage: Decimal::new(5, 0),
            status,
            requires_recount: false,
            assigned_to: None,
            counted_by: None,
            counted_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[rstest]
    #[case(100, 94, -6, Some(Decimal::new(6, 0)), false)]
    #[case(100, 97, -3, Some(Decimal::new(3, 0)), true)]
    #[case(100, 105, 5, Some(Decimal::new(5, 0)), true)]
    #[case(100, 100, 0, Some(Decimal::ZERO), true)]
    #[case(0, 0, 0, None, true)]
    #[case(0, 4, 4, None, false)]
    #[case(3, 2, -1, Some(Decimal::new(3333, 2)), false)]
    fn evaluates_counts_against_tolerance(
        #[case] system: i32,
        #[case] counted: i32,
        #[case] variance: i32,
        #[case] pct: Option<Decimal>,
        #[case] within: bool,
    ) {
        let eval = evaluate_count(system, counted, Decimal::new(5, 0));
        assert_eq!(eval.variance, variance);
        assert_eq!(eval.variance_percentage, pct);
        assert_eq!(eval.within_tolerance, within);
    }

    #[test]
    fn rollup_counts_closed_tasks_and_variances() {
        let tasks = vec![
            task(CountTaskStatus::Completed, Some(0)),
            task(CountTaskStatus::Completed, Some(-2)),
            task(CountTaskStatus::Skipped, None),
            task(CountTaskStatus::VarianceReview, Some(8)),
            task(CountTaskStatus::Pending, None),
        ];
        let rollup = summarize_campaign(&tasks);
        assert_eq!(rollup.total_tasks, 5);
        assert_eq!(rollup.completed_tasks, 3);
        assert_eq!(rollup.variances_found, 2);
        assert_eq!(rollup.active_tasks, 2);
        assert!(!rollup.is_complete());
    }

    #[test]
    fn shrink_must_leave_reservations_covered() {
        let now = Utc::now();
        let row = inventory::Model {
            id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            quantity_on_hand: 100,
            quantity_reserved: 99,
            created_at: now,
            updated_at: now,
        };
        assert!(variance_covers_reservations(Some(&row), -1));
        assert!(!variance_covers_reservations(Some(&row), -3));
        assert!(variance_covers_reservations(Some(&row), 4));
        assert!(!variance_covers_reservations(None, -1));
    }

    #[test]
    fn empty_campaign_is_never_complete() {
        assert!(!summarize_campaign(&[]).is_complete());
    }

    fn status_strategy() -> impl Strategy<Value = CountTaskStatus> {
        prop_oneof![
            Just(CountTaskStatus::Pending),
            Just(CountTaskStatus::Assigned),
            Just(CountTaskStatus::InProgress),
            Just(CountTaskStatus::Completed),
            Just(CountTaskStatus::VarianceReview),
            Just(CountTaskStatus::RecountRequired),
            Just(CountTaskStatus::Skipped),
            Just(CountTaskStatus::Cancelled),
        ]
    }

    proptest! {
        #[test]
        fn rollup_matches_direct_scan(
            specs in prop::collection::vec((status_strategy(), prop::option::of(-20i32..20)), 0..40)
        ) {
            let tasks: Vec<_> = specs.iter().map(|(s, v)| task(*s, *v)).collect();
            let rollup = summarize_campaign(&tasks);

            let closed = tasks.iter().filter(|t| matches!(
                t.status,
                CountTaskStatus::Completed | CountTaskStatus::Skipped | CountTaskStatus::Cancelled
            )).count() as i32;
            let variances = tasks.iter().filter(|t| matches!(t.variance, Some(v) if v != 0)).count() as i32;

            prop_assert_eq!(rollup.total_tasks, tasks.len() as i32);
            prop_assert_eq!(rollup.completed_tasks, closed);
            prop_assert_eq!(rollup.variances_found, variances);
            prop_assert_eq!(rollup.completed_tasks + rollup.active_tasks, rollup.total_tasks);
            prop_assert_eq!(rollup.is_complete(), !tasks.is_empty() && closed == tasks.len() as i32);
        }

        #[test]
        fn nonzero_system_always_has_percentage(system in 1i32..10_000, counted in 0i32..10_000) {
            let eval = evaluate_count(system, counted, Decimal::new(5, 0));
            prop_assert!(eval.variance_percentage.is_some());
            prop_assert_eq!(eval.variance, counted - system);
        }
    }
}

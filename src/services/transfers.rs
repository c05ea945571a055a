use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::unit_of_work;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::TRANSFERS;
use crate::models::{
    inventory_transaction::TransactionType,
    inventory_transfer::{self, TransferStatus},
    StatusTransition,
};
use crate::notifications::{NotificationType, Notifier};
use crate::services::audit::AuditEntry;
use crate::services::generate_number;
use crate::services::inventory::{
    adjust_on_hand, append_ledger, find_or_create_row, load_active_location, load_variant,
    require_row, withdraw_available, LedgerEntry,
};

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransferRequest {
    pub variant_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RejectTransferRequest {
    #[validate(length(min = 1, max = 500, message = "A rejection reason is required"))]
    pub reason: String,
}

/// Stock moves between locations, approved by a manager.
#[derive(Clone)]
pub struct TransferService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
    notifier: Notifier,
}

impl TransferService {
    pub fn new(db_pool: Arc<DatabaseConnection>, event_sender: EventSender, notifier: Notifier) -> Self {
        Self {
            db_pool,
            event_sender,
            notifier,
        }
    }

    #[instrument(skip(self, request))]
    pub async fn create_transfer(
        &self,
        request: CreateTransferRequest,
        actor: Uuid,
    ) -> Result<inventory_transfer::Model, ServiceError> {
        request.validate()?;
        if request.from_location_id == request.to_location_id {
            return Err(ServiceError::ValidationError(
                "Source and destination locations must differ".into(),
            ));
        }

        let transfer = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                load_variant(txn, request.variant_id).await?;
                load_active_location(txn, request.from_location_id).await?;
                load_active_location(txn, request.to_location_id).await?;

                let source = require_row(txn, request.variant_id, request.from_location_id).await?;
                if source.available() < request.quantity {
                    return Err(ServiceError::InsufficientStock(format!(
                        "Only {} units available at the source location",
                        source.available()
                    )));
                }

                let now = Utc::now();
                let transfer = inventory_transfer::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    transfer_number: Set(generate_number("TRF")),
                    variant_id: Set(request.variant_id),
                    from_location_id: Set(request.from_location_id),
                    to_location_id: Set(request.to_location_id),
                    quantity: Set(request.quantity),
                    status: Set(TransferStatus::Pending),
                    reason: Set(request.reason),
                    rejection_reason: Set(None),
                    requested_by: Set(Some(actor)),
                    reviewed_by: Set(None),
                    reviewed_at: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(txn)
                .await?;

                AuditEntry::new("TRANSFER_REQUESTED", "inventory_transfer", transfer.id)
                    .by(actor)
                    .after(serde_json::json!({
                        "transfer_number": transfer.transfer_number,
                        "quantity": transfer.quantity,
                    }))
                    .insert(txn)
                    .await?;
                Ok(transfer)
            })
        })
        .await?;

        info!(transfer = %transfer.transfer_number, "transfer requested");
        Ok(transfer)
    }

    #[instrument(skip(self))]
    pub async fn list_pending(&self) -> Result<Vec<inventory_transfer::Model>, ServiceError> {
        Ok(inventory_transfer::Entity::find()
            .filter(inventory_transfer::Column::Status.eq(TransferStatus::Pending))
            .order_by_asc(inventory_transfer::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?)
    }

    /// Moves the stock: guarded decrement at the source, increment at the
    /// destination and a TRANSFER ledger pair.
    #[instrument(skip(self))]
    pub async fn approve_transfer(
        &self,
        transfer_id: Uuid,
        actor: Uuid,
    ) -> Result<inventory_transfer::Model, ServiceError> {
        let transfer = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let transfer = load_transfer(txn, transfer_id).await?;
                let next = transfer.status.transition_to(TransferStatus::Completed)?;
                load_active_location(txn, transfer.to_location_id).await?;

                let source =
                    require_row(txn, transfer.variant_id, transfer.from_location_id).await?;
                withdraw_available(txn, source.id, transfer.quantity).await?;
                let destination =
                    find_or_create_row(txn, transfer.variant_id, transfer.to_location_id).await?;
                adjust_on_hand(txn, destination.id, transfer.quantity).await?;

                for (location_id, change) in [
                    (transfer.from_location_id, -transfer.quantity),
                    (transfer.to_location_id, transfer.quantity),
                ] {
                    append_ledger(
                        txn,
                        LedgerEntry {
                            variant_id: transfer.variant_id,
                            location_id,
                            transaction_type: TransactionType::Transfer,
                            quantity_change: change,
                            reference_type: "TRANSFER",
                            reference_id: Some(transfer.id),
                            user_id: Some(actor),
                            notes: Some(transfer.transfer_number.clone()),
                        },
                    )
                    .await?;
                }

                let now = Utc::now();
                let mut active = transfer.into_active_model();
                active.status = Set(next);
                active.reviewed_by = Set(Some(actor));
                active.reviewed_at = Set(Some(now));
                active.updated_at = Set(now);
                let transfer = active.update(txn).await?;

                AuditEntry::new("TRANSFER_APPROVED", "inventory_transfer", transfer.id)
                    .by(actor)
                    .before(serde_json::json!({ "status": TransferStatus::Pending }))
                    .after(serde_json::json!({ "status": transfer.status }))
                    .summary(format!(
                        "Moved {} units for {}",
                        transfer.quantity, transfer.transfer_number
                    ))
                    .insert(txn)
                    .await?;
                Ok(transfer)
            })
        })
        .await?;

        TRANSFERS.with_label_values(&["approved"]).inc();
        self.notify_requester(&transfer, "Transfer approved", "was approved")
            .await;
        self.event_sender
            .publish(Event::TransferApproved(transfer.id))
            .await;
        Ok(transfer)
    }

    #[instrument(skip(self, request))]
    pub async fn reject_transfer(
        &self,
        transfer_id: Uuid,
        request: RejectTransferRequest,
        actor: Uuid,
    ) -> Result<inventory_transfer::Model, ServiceError> {
        request.validate()?;
        let reason = request.reason.trim().to_string();
        if reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "A rejection reason is required".into(),
            ));
        }

        let transfer = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let transfer = load_transfer(txn, transfer_id).await?;
                let next = transfer.status.transition_to(TransferStatus::Rejected)?;

                let now = Utc::now();
                let mut active = transfer.into_active_model();
                active.status = Set(next);
                active.rejection_reason = Set(Some(reason.clone()));
                active.reviewed_by = Set(Some(actor));
                active.reviewed_at = Set(Some(now));
                active.updated_at = Set(now);
                let transfer = active.update(txn).await?;

                AuditEntry::new("TRANSFER_REJECTED", "inventory_transfer", transfer.id)
                    .by(actor)
                    .before(serde_json::json!({ "status": TransferStatus::Pending }))
                    .after(serde_json::json!({ "status": transfer.status }))
                    .summary(reason)
                    .insert(txn)
                    .await?;
                Ok(transfer)
            })
        })
        .await?;

        TRANSFERS.with_label_values(&["rejected"]).inc();
        self.notify_requester(&transfer, "Transfer rejected", "was rejected")
            .await;
        self.event_sender
            .publish(Event::TransferRejected(transfer.id))
            .await;
        Ok(transfer)
    }

    async fn notify_requester(
        &self,
        transfer: &inventory_transfer::Model,
        title: &str,
        verb: &str,
    ) {
        if let Some(requester) = transfer.requested_by {
            let mut message = format!("Transfer {} {}", transfer.transfer_number, verb);
            if let Some(reason) = &transfer.rejection_reason {
                message.push_str(&format!(": {}", reason));
            }
            self.notifier
                .notify(requester, NotificationType::TransferDecision, title, message)
                .await;
        }
    }
}

async fn load_transfer<C: sea_orm::ConnectionTrait>(
    conn: &C,
    transfer_id: Uuid,
) -> Result<inventory_transfer::Model, ServiceError> {
    inventory_transfer::Entity::find_by_id(transfer_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Transfer {} not found", transfer_id)))
}

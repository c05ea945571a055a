//! Audit trail and order status history writers.
//!
//! Both are called from inside a workflow's unit of work so the trail commits
//! or rolls back together with the change it describes.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{audit_event, order::OrderStatus, order_status_history};

/// Builder for one `audit_events` row.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    action: &'static str,
    entity_type: &'static str,
    entity_id: Uuid,
    user_id: Option<Uuid>,
    before: Option<Value>,
    after: Option<Value>,
    summary: Option<String>,
}

impl AuditEntry {
    pub fn new(action: &'static str, entity_type: &'static str, entity_id: Uuid) -> Self {
        Self {
            action,
            entity_type,
            entity_id,
            user_id: None,
            before: None,
            after: None,
            summary: None,
        }
    }

    pub fn by(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn before(mut self, value: Value) -> Self {
        self.before = Some(value);
        self
    }

    pub fn after(mut self, value: Value) -> Self {
        self.after = Some(value);
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub async fn insert<C: ConnectionTrait>(
        self,
        conn: &C,
    ) -> Result<audit_event::Model, ServiceError> {
        let row = audit_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(self.user_id),
            action: Set(self.action.to_string()),
            entity_type: Set(self.entity_type.to_string()),
            entity_id: Set(self.entity_id),
            before: Set(self.before),
            after: Set(self.after),
            summary: Set(self.summary),
            created_at: Set(Utc::now()),
        };
        Ok(row.insert(conn).await?)
    }
}

/// Appends an order status history row.
pub async fn record_order_status<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    from_status: Option<OrderStatus>,
    to_status: OrderStatus,
    changed_by: Option<Uuid>,
    summary: Option<String>,
) -> Result<order_status_history::Model, ServiceError> {
    let row = order_status_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        from_status: Set(from_status),
        to_status: Set(to_status),
        changed_by: Set(changed_by),
        summary: Set(summary),
        created_at: Set(Utc::now()),
    };
    Ok(row.insert(conn).await?)
}

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentEventType {
    #[sea_orm(string_value = "ITEM_PICKED")]
    ItemPicked,
    #[sea_orm(string_value = "ITEM_SHORT")]
    ItemShort,
    #[sea_orm(string_value = "ITEM_PACKED")]
    ItemPacked,
    #[sea_orm(string_value = "LIST_COMPLETED")]
    ListCompleted,
    #[sea_orm(string_value = "TASK_COMPLETED")]
    TaskCompleted,
}

/// Scan-level history for pick lists and work tasks.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fulfillment_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// "PICK_LIST" or "WORK_TASK"
    pub source_type: String,
    pub source_id: Uuid,
    pub item_id: Option<Uuid>,
    pub event_type: FulfillmentEventType,
    pub user_id: Option<Uuid>,
    pub scanned_code: Option<String>,
    pub quantity: i32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

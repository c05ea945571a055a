use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::StatusTransition;

/// Item status shared by pick list items and task items.
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
pub enum WorkItemStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "SHORT_PICK")]
    ShortPick,
    #[sea_orm(string_value = "SKIPPED")]
    Skipped,
}

impl StatusTransition for WorkItemStatus {
    const ENTITY: &'static str = "Item";

    fn allowed_transitions(self) -> &'static [Self] {
        use WorkItemStatus::*;
        match self {
            Pending => &[Completed, ShortPick, Skipped],
            Completed | ShortPick | Skipped => &[],
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pick_list_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub pick_list_id: Uuid,
    pub order_id: Uuid,
    pub order_item_id: Uuid,
    pub variant_id: Uuid,
    pub location_id: Uuid,
    pub quantity_to_pick: i32,
    pub quantity_picked: i32,
    pub pick_sequence: i32,
    pub status: WorkItemStatus,
    pub picked_by: Option<Uuid>,
    pub picked_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::pick_list::Entity",
        from = "Column::PickListId",
        to = "super::pick_list::Column::Id"
    )]
    PickList,
}

impl Related<super::pick_list::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PickList.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

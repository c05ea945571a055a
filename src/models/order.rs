use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::StatusTransition;

/// Enum representing the possible statuses of an order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "ALLOCATED")]
    Allocated,
    #[sea_orm(string_value = "PICKING")]
    Picking,
    #[sea_orm(string_value = "PICKED")]
    Picked,
    #[sea_orm(string_value = "PACKED")]
    Packed,
    #[sea_orm(string_value = "SHIPPED")]
    Shipped,
    #[sea_orm(string_value = "DELIVERED")]
    Delivered,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
    #[sea_orm(string_value = "RETURNED")]
    Returned,
}

impl StatusTransition for OrderStatus {
    const ENTITY: &'static str = "Order";

    fn allowed_transitions(self) -> &'static [Self] {
        use OrderStatus::*;
        match self {
            Pending => &[Allocated, Cancelled],
            Allocated => &[Picking, Cancelled],
            Picking => &[Picked, Cancelled],
            Picked => &[Packed],
            Packed => &[Shipped],
            Shipped => &[Delivered, Returned],
            Delivered => &[Returned],
            Cancelled | Returned => &[],
        }
    }
}

/// The `orders` table.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Unique order number.
    #[sea_orm(unique)]
    pub order_number: String,

    pub customer_name: String,

    pub status: OrderStatus,

    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Set when the order moves to SHIPPED.
    pub shipped_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    Items,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceError;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case(OrderStatus::Pending, OrderStatus::Allocated, true)]
    #[case(OrderStatus::Allocated, OrderStatus::Picking, true)]
    #[case(OrderStatus::Picking, OrderStatus::Picked, true)]
    #[case(OrderStatus::Picked, OrderStatus::Packed, true)]
    #[case(OrderStatus::Packed, OrderStatus::Shipped, true)]
    #[case(OrderStatus::Pending, OrderStatus::Shipped, false)]
    #[case(OrderStatus::Picked, OrderStatus::Cancelled, false)]
    #[case(OrderStatus::Cancelled, OrderStatus::Pending, false)]
    fn order_transition_table(
        #[case] from: OrderStatus,
        #[case] to: OrderStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
        assert_eq!(from.transition_to(to).is_ok(), allowed);
    }

    #[test]
    fn terminal_statuses_have_no_exits() {
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Returned.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
    }

    #[test]
    fn rejected_transition_names_both_statuses() {
        assert_matches!(
            OrderStatus::Pending.transition_to(OrderStatus::Shipped),
            Err(ServiceError::InvalidStatus(msg)) if msg == "Order cannot move from PENDING to SHIPPED"
        );
    }
}

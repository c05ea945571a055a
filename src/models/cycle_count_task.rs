use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::StatusTransition;

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
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CountTaskStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "ASSIGNED")]
    Assigned,
    #[sea_orm(string_value = "IN_PROGRESS")]
    InProgress,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "VARIANCE_REVIEW")]
    VarianceReview,
    #[sea_orm(string_value = "RECOUNT_REQUIRED")]
    RecountRequired,
    #[sea_orm(string_value = "SKIPPED")]
    Skipped,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
}

impl StatusTransition for CountTaskStatus {
    const ENTITY: &'static str = "Cycle count task";

    fn allowed_transitions(self) -> &'static [Self] {
        use CountTaskStatus::*;
        match self {
            Pending | Assigned | InProgress => &[
                Assigned,
                InProgress,
                Completed,
                VarianceReview,
                RecountRequired,
                Skipped,
                Cancelled,
            ],
            VarianceReview => &[Completed, RecountRequired, Cancelled],
            RecountRequired => &[
                Assigned,
                InProgress,
                Completed,
                VarianceReview,
                RecountRequired,
                Skipped,
                Cancelled,
            ],
            Completed | Skipped | Cancelled => &[],
        }
    }
}

impl CountTaskStatus {
    /// Statuses that count towards `completed_tasks`.
    pub fn is_closed(self) -> bool {
        self.is_terminal()
    }
}

/// The `cycle_count_tasks` table: one (variant, location) row to count.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cycle_count_tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub variant_id: Uuid,
    pub location_id: Uuid,
    /// On-hand snapshot taken when the task was created.
    pub system_quantity: i32,
    pub counted_quantity: Option<i32>,
    pub variance: Option<i32>,
    pub variance_percentage: Option<Decimal>,
    pub tolerance_percentage: Decimal,
    pub status: CountTaskStatus,
    pub requires_recount: bool,
    pub assigned_to: Option<Uuid>,
    pub counted_by: Option<Uuid>,
    pub counted_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::cycle_count_campaign::Entity",
        from = "Column::CampaignId",
        to = "super::cycle_count_campaign::Column::Id"
    )]
    Campaign,
}

impl Related<super::cycle_count_campaign::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Campaign.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CountTaskStatus::Pending, CountTaskStatus::Completed, true)]
    #[case(CountTaskStatus::Assigned, CountTaskStatus::VarianceReview, true)]
    #[case(CountTaskStatus::VarianceReview, CountTaskStatus::Completed, true)]
    #[case(CountTaskStatus::VarianceReview, CountTaskStatus::Skipped, false)]
    #[case(CountTaskStatus::RecountRequired, CountTaskStatus::Completed, true)]
    #[case(CountTaskStatus::Completed, CountTaskStatus::RecountRequired, false)]
    #[case(CountTaskStatus::Skipped, CountTaskStatus::Completed, false)]
    fn task_transition_table(
        #[case] from: CountTaskStatus,
        #[case] to: CountTaskStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn closed_statuses() {
        assert!(CountTaskStatus::Completed.is_closed());
        assert!(CountTaskStatus::Skipped.is_closed());
        assert!(CountTaskStatus::Cancelled.is_closed());
        assert!(!CountTaskStatus::VarianceReview.is_closed());
        assert!(!CountTaskStatus::RecountRequired.is_closed());
    }
}

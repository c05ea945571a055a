use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// The `product_variants` table: the sellable, stockable unit.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product_variants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub sku: String,
    pub upc: Option<String>,
    pub barcode: Option<String>,
    pub name: String,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Model {
    /// Codes a scanner may legitimately produce for this variant.
    pub fn scan_codes(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.sku.as_str())
            .chain(self.upc.as_deref())
            .chain(self.barcode.as_deref())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::inventory::Entity")]
    Inventory,
}

impl Related<super::inventory::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Inventory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

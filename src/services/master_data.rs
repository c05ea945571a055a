use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::unit_of_work;
use crate::errors::ServiceError;
use crate::models::{
    location::{self, LocationType},
    product_variant,
};
use crate::services::audit::AuditEntry;

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateLocationRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub location_type: LocationType,
    #[validate(length(min = 1, max = 128))]
    pub barcode: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateVariantRequest {
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[validate(length(min = 1, max = 64))]
    pub upc: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub barcode: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[schema(value_type = f64)]
    pub price: Decimal,
}

/// Locations and product variants.
#[derive(Clone)]
pub struct CatalogService {
    db_pool: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_location(
        &self,
        request: CreateLocationRequest,
        actor: Uuid,
    ) -> Result<location::Model, ServiceError> {
        request.validate()?;
        let code = request.code.trim().to_uppercase();

        let location = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let existing = location::Entity::find()
                    .filter(location::Column::Code.eq(code.clone()))
                    .one(txn)
                    .await?;
                if existing.is_some() {
                    return Err(ServiceError::Conflict(format!(
                        "Location {} already exists",
                        code
                    )));
                }

                let location = location::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    code: Set(code),
                    name: Set(request.name),
                    location_type: Set(request.location_type),
                    barcode: Set(request.barcode),
                    is_active: Set(request.is_active.unwrap_or(true)),
                    created_at: Set(Utc::now()),
                }
                .insert(txn)
                .await?;

                AuditEntry::new("LOCATION_CREATED", "location", location.id)
                    .by(actor)
                    .after(serde_json::json!({
                        "code": location.code,
                        "location_type": location.location_type,
                    }))
                    .insert(txn)
                    .await?;
                Ok(location)
            })
        })
        .await?;

        info!(location_id = %location.id, "location created");
        Ok(location)
    }

    #[instrument(skip(self, request), fields(sku = %request.sku))]
    pub async fn create_variant(
        &self,
        request: CreateVariantRequest,
        actor: Uuid,
    ) -> Result<product_variant::Model, ServiceError> {
        request.validate()?;
        if request.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Price cannot be negative".into(),
            ));
        }
        let sku = request.sku.trim().to_string();

        let variant = unit_of_work(&self.db_pool, move |txn| {
            Box::pin(async move {
                let existing = product_variant::Entity::find()
                    .filter(product_variant::Column::Sku.eq(sku.clone()))
                    .one(txn)
                    .await?;
                if existing.is_some() {
                    return Err(ServiceError::Conflict(format!(
                        "Variant with SKU {} already exists",
                        sku
                    )));
                }

                let variant = product_variant::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    sku: Set(sku),
                    upc: Set(request.upc),
                    barcode: Set(request.barcode),
                    name: Set(request.name),
                    price: Set(request.price),
                    created_at: Set(Utc::now()),
                }
                .insert(txn)
                .await?;

                AuditEntry::new("VARIANT_CREATED", "product_variant", variant.id)
                    .by(actor)
                    .after(serde_json::json!({ "sku": variant.sku, "price": variant.price }))
                    .insert(txn)
                    .await?;
                Ok(variant)
            })
        })
        .await?;

        info!(variant_id = %variant.id, "variant created");
        Ok(variant)
    }
}

use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::prelude::*;
use std::time::Duration;
use tracing::{error, info};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_master_data::Migration),
            Box::new(m20260101_000002_create_inventory_tables::Migration),
            Box::new(m20260101_000003_create_order_tables::Migration),
            Box::new(m20260101_000004_create_cycle_count_tables::Migration),
            Box::new(m20260101_000005_create_fulfillment_tables::Migration),
            Box::new(m20260101_000006_create_return_tables::Migration),
        ]
    }
}

fn status_col<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col).string_len(32).not_null().to_owned()
}

fn money_col<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col).decimal_len(16, 4).not_null().to_owned()
}

fn timestamp_col<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp_with_time_zone()
        .not_null()
        .to_owned()
}

fn nullable_timestamp_col<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col).timestamp_with_time_zone().null().to_owned()
}

fn uuid_pk<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col).uuid().not_null().primary_key().to_owned()
}

fn counter_col<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col).integer().not_null().default(0).to_owned()
}

mod m20260101_000001_create_master_data {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000001_create_master_data"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Locations::Table)
                        .if_not_exists()
                        .col(uuid_pk(Locations::Id))
                        .col(
                            ColumnDef::new(Locations::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Locations::Name).string().not_null())
                        .col(status_col(Locations::LocationType))
                        .col(ColumnDef::new(Locations::Barcode).string().null())
                        .col(
                            ColumnDef::new(Locations::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(timestamp_col(Locations::CreatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductVariants::Table)
                        .if_not_exists()
                        .col(uuid_pk(ProductVariants::Id))
                        .col(
                            ColumnDef::new(ProductVariants::Sku)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(ProductVariants::Upc).string().null())
                        .col(ColumnDef::new(ProductVariants::Barcode).string().null())
                        .col(ColumnDef::new(ProductVariants::Name).string().not_null())
                        .col(money_col(ProductVariants::Price))
                        .col(timestamp_col(ProductVariants::CreatedAt))
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductVariants::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Locations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Locations {
        Table,
        Id,
        Code,
        Name,
        LocationType,
        Barcode,
        IsActive,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub enum ProductVariants {
        Table,
        Id,
        Sku,
        Upc,
        Barcode,
        Name,
        Price,
        CreatedAt,
    }
}

mod m20260101_000002_create_inventory_tables {
    use super::m20260101_000001_create_master_data::{Locations, ProductVariants};
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000002_create_inventory_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Inventory::Table)
                        .if_not_exists()
                        .col(uuid_pk(Inventory::Id))
                        .col(ColumnDef::new(Inventory::VariantId).uuid().not_null())
                        .col(ColumnDef::new(Inventory::LocationId).uuid().not_null())
                        .col(counter_col(Inventory::QuantityOnHand))
                        .col(counter_col(Inventory::QuantityReserved))
                        .col(timestamp_col(Inventory::CreatedAt))
                        .col(timestamp_col(Inventory::UpdatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_variant_id")
                                .from(Inventory::Table, Inventory::VariantId)
                                .to(ProductVariants::Table, ProductVariants::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_location_id")
                                .from(Inventory::Table, Inventory::LocationId)
                                .to(Locations::Table, Locations::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_variant_location")
                        .table(Inventory::Table)
                        .col(Inventory::VariantId)
                        .col(Inventory::LocationId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InventoryTransactions::Table)
                        .if_not_exists()
                        .col(uuid_pk(InventoryTransactions::Id))
                        .col(
                            ColumnDef::new(InventoryTransactions::VariantId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::LocationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(status_col(InventoryTransactions::TransactionType))
                        .col(
                            ColumnDef::new(InventoryTransactions::QuantityChange)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::ReferenceType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::ReferenceId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryTransactions::UserId).uuid().null())
                        .col(ColumnDef::new(InventoryTransactions::Notes).text().null())
                        .col(timestamp_col(InventoryTransactions::CreatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_transactions_variant_id")
                        .table(InventoryTransactions::Table)
                        .col(InventoryTransactions::VariantId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InventoryAllocations::Table)
                        .if_not_exists()
                        .col(uuid_pk(InventoryAllocations::Id))
                        .col(
                            ColumnDef::new(InventoryAllocations::OrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAllocations::OrderItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAllocations::VariantId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAllocations::LocationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAllocations::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(timestamp_col(InventoryAllocations::CreatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_allocations_order_id")
                        .table(InventoryAllocations::Table)
                        .col(InventoryAllocations::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Backorders::Table)
                        .if_not_exists()
                        .col(uuid_pk(Backorders::Id))
                        .col(ColumnDef::new(Backorders::OrderId).uuid().not_null())
                        .col(ColumnDef::new(Backorders::OrderItemId).uuid().not_null())
                        .col(ColumnDef::new(Backorders::VariantId).uuid().not_null())
                        .col(
                            ColumnDef::new(Backorders::QuantityShort)
                                .integer()
                                .not_null(),
                        )
                        .col(status_col(Backorders::Status))
                        .col(timestamp_col(Backorders::CreatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InventoryTransfers::Table)
                        .if_not_exists()
                        .col(uuid_pk(InventoryTransfers::Id))
                        .col(
                            ColumnDef::new(InventoryTransfers::TransferNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransfers::VariantId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransfers::FromLocationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransfers::ToLocationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransfers::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(status_col(InventoryTransfers::Status))
                        .col(ColumnDef::new(InventoryTransfers::Reason).text().null())
                        .col(
                            ColumnDef::new(InventoryTransfers::RejectionReason)
                                .text()
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryTransfers::RequestedBy).uuid().null())
                        .col(ColumnDef::new(InventoryTransfers::ReviewedBy).uuid().null())
                        .col(nullable_timestamp_col(InventoryTransfers::ReviewedAt))
                        .col(timestamp_col(InventoryTransfers::CreatedAt))
                        .col(timestamp_col(InventoryTransfers::UpdatedAt))
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for table in [
                InventoryTransfers::Table.into_iden(),
                Backorders::Table.into_iden(),
                InventoryAllocations::Table.into_iden(),
                InventoryTransactions::Table.into_iden(),
                Inventory::Table.into_iden(),
            ] {
                manager
                    .drop_table(Table::drop().table(table).to_owned())
                    .await?;
            }
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum Inventory {
        Table,
        Id,
        VariantId,
        LocationId,
        QuantityOnHand,
        QuantityReserved,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum InventoryTransactions {
        Table,
        Id,
        VariantId,
        LocationId,
        TransactionType,
        QuantityChange,
        ReferenceType,
        ReferenceId,
        UserId,
        Notes,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum InventoryAllocations {
        Table,
        Id,
        OrderId,
        OrderItemId,
        VariantId,
        LocationId,
        Quantity,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Backorders {
        Table,
        Id,
        OrderId,
        OrderItemId,
        VariantId,
        QuantityShort,
        Status,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum InventoryTransfers {
        Table,
        Id,
        TransferNumber,
        VariantId,
        FromLocationId,
        ToLocationId,
        Quantity,
        Status,
        Reason,
        RejectionReason,
        RequestedBy,
        ReviewedBy,
        ReviewedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20260101_000003_create_order_tables {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000003_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(uuid_pk(Orders::Id))
                        .col(
                            ColumnDef::new(Orders::OrderNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::CustomerName).string().not_null())
                        .col(status_col(Orders::Status))
                        .col(ColumnDef::new(Orders::Notes).text().null())
                        .col(timestamp_col(Orders::CreatedAt))
                        .col(timestamp_col(Orders::UpdatedAt))
                        .col(nullable_timestamp_col(Orders::ShippedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(uuid_pk(OrderItems::Id))
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::VariantId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(counter_col(OrderItems::QuantityAllocated))
                        .col(money_col(OrderItems::UnitPrice))
                        .col(timestamp_col(OrderItems::CreatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order_id")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderStatusHistory::Table)
                        .if_not_exists()
                        .col(uuid_pk(OrderStatusHistory::Id))
                        .col(
                            ColumnDef::new(OrderStatusHistory::OrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderStatusHistory::FromStatus)
                                .string_len(32)
                                .null(),
                        )
                        .col(status_col(OrderStatusHistory::ToStatus))
                        .col(ColumnDef::new(OrderStatusHistory::ChangedBy).uuid().null())
                        .col(ColumnDef::new(OrderStatusHistory::Summary).text().null())
                        .col(timestamp_col(OrderStatusHistory::CreatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(AuditEvents::Table)
                        .if_not_exists()
                        .col(uuid_pk(AuditEvents::Id))
                        .col(ColumnDef::new(AuditEvents::UserId).uuid().null())
                        .col(ColumnDef::new(AuditEvents::Action).string().not_null())
                        .col(ColumnDef::new(AuditEvents::EntityType).string().not_null())
                        .col(ColumnDef::new(AuditEvents::EntityId).uuid().not_null())
                        .col(ColumnDef::new(AuditEvents::Before).json().null())
                        .col(ColumnDef::new(AuditEvents::After).json().null())
                        .col(ColumnDef::new(AuditEvents::Summary).text().null())
                        .col(timestamp_col(AuditEvents::CreatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_audit_events_entity")
                        .table(AuditEvents::Table)
                        .col(AuditEvents::EntityType)
                        .col(AuditEvents::EntityId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PendingSyncs::Table)
                        .if_not_exists()
                        .col(uuid_pk(PendingSyncs::Id))
                        .col(ColumnDef::new(PendingSyncs::Target).string().not_null())
                        .col(ColumnDef::new(PendingSyncs::ReferenceId).uuid().not_null())
                        .col(ColumnDef::new(PendingSyncs::Payload).json().not_null())
                        .col(status_col(PendingSyncs::Status))
                        .col(counter_col(PendingSyncs::Attempts))
                        .col(ColumnDef::new(PendingSyncs::LastError).text().null())
                        .col(timestamp_col(PendingSyncs::CreatedAt))
                        .col(timestamp_col(PendingSyncs::UpdatedAt))
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for table in [
                PendingSyncs::Table.into_iden(),
                AuditEvents::Table.into_iden(),
                OrderStatusHistory::Table.into_iden(),
                OrderItems::Table.into_iden(),
                Orders::Table.into_iden(),
            ] {
                manager
                    .drop_table(Table::drop().table(table).to_owned())
                    .await?;
            }
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        OrderNumber,
        CustomerName,
        Status,
        Notes,
        CreatedAt,
        UpdatedAt,
        ShippedAt,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        VariantId,
        Quantity,
        QuantityAllocated,
        UnitPrice,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderStatusHistory {
        Table,
        Id,
        OrderId,
        FromStatus,
        ToStatus,
        ChangedBy,
        Summary,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum AuditEvents {
        Table,
        Id,
        UserId,
        Action,
        EntityType,
        EntityId,
        Before,
        After,
        Summary,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum PendingSyncs {
        Table,
        Id,
        Target,
        ReferenceId,
        Payload,
        Status,
        Attempts,
        LastError,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20260101_000004_create_cycle_count_tables {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000004_create_cycle_count_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CycleCountCampaigns::Table)
                        .if_not_exists()
                        .col(uuid_pk(CycleCountCampaigns::Id))
                        .col(ColumnDef::new(CycleCountCampaigns::Name).string().not_null())
                        .col(status_col(CycleCountCampaigns::Status))
                        .col(money_col(CycleCountCampaigns::TolerancePercentage))
                        .col(counter_col(CycleCountCampaigns::TotalTasks))
                        .col(counter_col(CycleCountCampaigns::CompletedTasks))
                        .col(counter_col(CycleCountCampaigns::VariancesFound))
                        .col(
                            ColumnDef::new(CycleCountCampaigns::SourceOrderId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(CycleCountCampaigns::CreatedBy).uuid().null())
                        .col(timestamp_col(CycleCountCampaigns::CreatedAt))
                        .col(timestamp_col(CycleCountCampaigns::UpdatedAt))
                        .col(nullable_timestamp_col(CycleCountCampaigns::CompletedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CycleCountTasks::Table)
                        .if_not_exists()
                        .col(uuid_pk(CycleCountTasks::Id))
                        .col(ColumnDef::new(CycleCountTasks::CampaignId).uuid().not_null())
                        .col(ColumnDef::new(CycleCountTasks::VariantId).uuid().not_null())
                        .col(ColumnDef::new(CycleCountTasks::LocationId).uuid().not_null())
                        .col(
                            ColumnDef::new(CycleCountTasks::SystemQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CycleCountTasks::CountedQuantity)
                                .integer()
                                .null(),
                        )
                        .col(ColumnDef::new(CycleCountTasks::Variance).integer().null())
                        .col(
                            ColumnDef::new(CycleCountTasks::VariancePercentage)
                                .decimal_len(16, 4)
                                .null(),
                        )
                        .col(money_col(CycleCountTasks::TolerancePercentage))
                        .col(status_col(CycleCountTasks::Status))
                        .col(
                            ColumnDef::new(CycleCountTasks::RequiresRecount)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(CycleCountTasks::AssignedTo).uuid().null())
                        .col(ColumnDef::new(CycleCountTasks::CountedBy).uuid().null())
                        .col(nullable_timestamp_col(CycleCountTasks::CountedAt))
                        .col(ColumnDef::new(CycleCountTasks::Notes).text().null())
                        .col(timestamp_col(CycleCountTasks::CreatedAt))
                        .col(timestamp_col(CycleCountTasks::UpdatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cycle_count_tasks_campaign_id")
                                .from(CycleCountTasks::Table, CycleCountTasks::CampaignId)
                                .to(CycleCountCampaigns::Table, CycleCountCampaigns::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cycle_count_tasks_campaign_id")
                        .table(CycleCountTasks::Table)
                        .col(CycleCountTasks::CampaignId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CycleCountTasks::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CycleCountCampaigns::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CycleCountCampaigns {
        Table,
        Id,
        Name,
        Status,
        TolerancePercentage,
        TotalTasks,
        CompletedTasks,
        VariancesFound,
        SourceOrderId,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
        CompletedAt,
    }

    #[derive(DeriveIden)]
    enum CycleCountTasks {
        Table,
        Id,
        CampaignId,
        VariantId,
        LocationId,
        SystemQuantity,
        CountedQuantity,
        Variance,
        VariancePercentage,
        TolerancePercentage,
        Status,
        RequiresRecount,
        AssignedTo,
        CountedBy,
        CountedAt,
        Notes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20260101_000005_create_fulfillment_tables {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000005_create_fulfillment_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PickLists::Table)
                        .if_not_exists()
                        .col(uuid_pk(PickLists::Id))
                        .col(
                            ColumnDef::new(PickLists::PickListNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(status_col(PickLists::Status))
                        .col(ColumnDef::new(PickLists::AssignedTo).uuid().null())
                        .col(counter_col(PickLists::TotalItems))
                        .col(counter_col(PickLists::PickedItems))
                        .col(nullable_timestamp_col(PickLists::StartedAt))
                        .col(nullable_timestamp_col(PickLists::CompletedAt))
                        .col(timestamp_col(PickLists::CreatedAt))
                        .col(timestamp_col(PickLists::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PickListItems::Table)
                        .if_not_exists()
                        .col(uuid_pk(PickListItems::Id))
                        .col(ColumnDef::new(PickListItems::PickListId).uuid().not_null())
                        .col(ColumnDef::new(PickListItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(PickListItems::OrderItemId).uuid().not_null())
                        .col(ColumnDef::new(PickListItems::VariantId).uuid().not_null())
                        .col(ColumnDef::new(PickListItems::LocationId).uuid().not_null())
                        .col(
                            ColumnDef::new(PickListItems::QuantityToPick)
                                .integer()
                                .not_null(),
                        )
                        .col(counter_col(PickListItems::QuantityPicked))
                        .col(counter_col(PickListItems::PickSequence))
                        .col(status_col(PickListItems::Status))
                        .col(ColumnDef::new(PickListItems::PickedBy).uuid().null())
                        .col(nullable_timestamp_col(PickListItems::PickedAt))
                        .col(ColumnDef::new(PickListItems::Notes).text().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_pick_list_items_pick_list_id")
                                .from(PickListItems::Table, PickListItems::PickListId)
                                .to(PickLists::Table, PickLists::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(WorkTasks::Table)
                        .if_not_exists()
                        .col(uuid_pk(WorkTasks::Id))
                        .col(
                            ColumnDef::new(WorkTasks::TaskNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(status_col(WorkTasks::TaskType))
                        .col(status_col(WorkTasks::Status))
                        .col(ColumnDef::new(WorkTasks::AssignedTo).uuid().null())
                        .col(counter_col(WorkTasks::TotalItems))
                        .col(counter_col(WorkTasks::CompletedItems))
                        .col(counter_col(WorkTasks::TotalOrders))
                        .col(counter_col(WorkTasks::CompletedOrders))
                        .col(nullable_timestamp_col(WorkTasks::StartedAt))
                        .col(nullable_timestamp_col(WorkTasks::CompletedAt))
                        .col(timestamp_col(WorkTasks::CreatedAt))
                        .col(timestamp_col(WorkTasks::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(TaskItems::Table)
                        .if_not_exists()
                        .col(uuid_pk(TaskItems::Id))
                        .col(ColumnDef::new(TaskItems::TaskId).uuid().not_null())
                        .col(ColumnDef::new(TaskItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(TaskItems::VariantId).uuid().not_null())
                        .col(ColumnDef::new(TaskItems::LocationId).uuid().not_null())
                        .col(
                            ColumnDef::new(TaskItems::QuantityRequired)
                                .integer()
                                .not_null(),
                        )
                        .col(counter_col(TaskItems::QuantityCompleted))
                        .col(counter_col(TaskItems::Sequence))
                        .col(status_col(TaskItems::Status))
                        .col(ColumnDef::new(TaskItems::CompletedBy).uuid().null())
                        .col(nullable_timestamp_col(TaskItems::CompletedAt))
                        .col(ColumnDef::new(TaskItems::Notes).text().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_task_items_task_id")
                                .from(TaskItems::Table, TaskItems::TaskId)
                                .to(WorkTasks::Table, WorkTasks::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(FulfillmentEvents::Table)
                        .if_not_exists()
                        .col(uuid_pk(FulfillmentEvents::Id))
                        .col(
                            ColumnDef::new(FulfillmentEvents::SourceType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(FulfillmentEvents::SourceId).uuid().not_null())
                        .col(ColumnDef::new(FulfillmentEvents::ItemId).uuid().null())
                        .col(status_col(FulfillmentEvents::EventType))
                        .col(ColumnDef::new(FulfillmentEvents::UserId).uuid().null())
                        .col(ColumnDef::new(FulfillmentEvents::ScannedCode).string().null())
                        .col(counter_col(FulfillmentEvents::Quantity))
                        .col(ColumnDef::new(FulfillmentEvents::Notes).text().null())
                        .col(timestamp_col(FulfillmentEvents::CreatedAt))
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for table in [
                FulfillmentEvents::Table.into_iden(),
                TaskItems::Table.into_iden(),
                WorkTasks::Table.into_iden(),
                PickListItems::Table.into_iden(),
                PickLists::Table.into_iden(),
            ] {
                manager
                    .drop_table(Table::drop().table(table).to_owned())
                    .await?;
            }
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum PickLists {
        Table,
        Id,
        PickListNumber,
        Status,
        AssignedTo,
        TotalItems,
        PickedItems,
        StartedAt,
        CompletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PickListItems {
        Table,
        Id,
        PickListId,
        OrderId,
        OrderItemId,
        VariantId,
        LocationId,
        QuantityToPick,
        QuantityPicked,
        PickSequence,
        Status,
        PickedBy,
        PickedAt,
        Notes,
    }

    #[derive(DeriveIden)]
    enum WorkTasks {
        Table,
        Id,
        TaskNumber,
        TaskType,
        Status,
        AssignedTo,
        TotalItems,
        CompletedItems,
        TotalOrders,
        CompletedOrders,
        StartedAt,
        CompletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum TaskItems {
        Table,
        Id,
        TaskId,
        OrderId,
        VariantId,
        LocationId,
        QuantityRequired,
        QuantityCompleted,
        Sequence,
        Status,
        CompletedBy,
        CompletedAt,
        Notes,
    }

    #[derive(DeriveIden)]
    enum FulfillmentEvents {
        Table,
        Id,
        SourceType,
        SourceId,
        ItemId,
        EventType,
        UserId,
        ScannedCode,
        Quantity,
        Notes,
        CreatedAt,
    }
}

mod m20260101_000006_create_return_tables {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000006_create_return_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ReturnOrders::Table)
                        .if_not_exists()
                        .col(uuid_pk(ReturnOrders::Id))
                        .col(
                            ColumnDef::new(ReturnOrders::RmaNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(ReturnOrders::OrderId).uuid().not_null())
                        .col(status_col(ReturnOrders::Status))
                        .col(ColumnDef::new(ReturnOrders::Reason).text().not_null())
                        .col(status_col(ReturnOrders::RefundStatus))
                        .col(
                            ColumnDef::new(ReturnOrders::RefundAmount)
                                .decimal_len(16, 4)
                                .null(),
                        )
                        .col(money_col(ReturnOrders::RestockingFee))
                        .col(ColumnDef::new(ReturnOrders::RejectionReason).text().null())
                        .col(ColumnDef::new(ReturnOrders::CreatedBy).uuid().null())
                        .col(nullable_timestamp_col(ReturnOrders::ReceivedAt))
                        .col(nullable_timestamp_col(ReturnOrders::InspectedAt))
                        .col(nullable_timestamp_col(ReturnOrders::RestockedAt))
                        .col(nullable_timestamp_col(ReturnOrders::RefundedAt))
                        .col(timestamp_col(ReturnOrders::CreatedAt))
                        .col(timestamp_col(ReturnOrders::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ReturnItems::Table)
                        .if_not_exists()
                        .col(uuid_pk(ReturnItems::Id))
                        .col(ColumnDef::new(ReturnItems::ReturnId).uuid().not_null())
                        .col(ColumnDef::new(ReturnItems::OrderItemId).uuid().not_null())
                        .col(ColumnDef::new(ReturnItems::VariantId).uuid().not_null())
                        .col(money_col(ReturnItems::UnitPrice))
                        .col(
                            ColumnDef::new(ReturnItems::QuantityRequested)
                                .integer()
                                .not_null(),
                        )
                        .col(counter_col(ReturnItems::QuantityReceived))
                        .col(counter_col(ReturnItems::QuantityRestockable))
                        .col(counter_col(ReturnItems::QuantityDisposed))
                        .col(ColumnDef::new(ReturnItems::Condition).string_len(32).null())
                        .col(ColumnDef::new(ReturnItems::InspectionNotes).text().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_return_items_return_id")
                                .from(ReturnItems::Table, ReturnItems::ReturnId)
                                .to(ReturnOrders::Table, ReturnOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ReturnEvents::Table)
                        .if_not_exists()
                        .col(uuid_pk(ReturnEvents::Id))
                        .col(ColumnDef::new(ReturnEvents::ReturnId).uuid().not_null())
                        .col(
                            ColumnDef::new(ReturnEvents::EventType)
                                .string_len(40)
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReturnEvents::UserId).uuid().null())
                        .col(ColumnDef::new(ReturnEvents::Notes).text().null())
                        .col(ColumnDef::new(ReturnEvents::Data).json().null())
                        .col(timestamp_col(ReturnEvents::CreatedAt))
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for table in [
                ReturnEvents::Table.into_iden(),
                ReturnItems::Table.into_iden(),
                ReturnOrders::Table.into_iden(),
            ] {
                manager
                    .drop_table(Table::drop().table(table).to_owned())
                    .await?;
            }
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum ReturnOrders {
        Table,
        Id,
        RmaNumber,
        OrderId,
        Status,
        Reason,
        RefundStatus,
        RefundAmount,
        RestockingFee,
        RejectionReason,
        CreatedBy,
        ReceivedAt,
        InspectedAt,
        RestockedAt,
        RefundedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ReturnItems {
        Table,
        Id,
        ReturnId,
        OrderItemId,
        VariantId,
        UnitPrice,
        QuantityRequested,
        QuantityReceived,
        QuantityRestockable,
        QuantityDisposed,
        Condition,
        InspectionNotes,
    }

    #[derive(DeriveIden)]
    enum ReturnEvents {
        Table,
        Id,
        ReturnId,
        EventType,
        UserId,
        Notes,
        Data,
        CreatedAt,
    }
}

/// Connects to `db_url` and applies every pending migration.
pub async fn run_migration(db_url: &str) -> Result<(), DbErr> {
    info!("Setting up database connection for migrations");

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(2)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;

    info!("Running database migrations");
    Migrator::up(&db, None).await.map_err(|e| {
        error!("Migration failed: {}", e);
        e
    })?;

    info!("Migrations completed successfully");
    Ok(())
}

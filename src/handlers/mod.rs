pub mod common;
pub mod cycle_counts;
pub mod inventory;
pub mod master_data;
pub mod orders;
pub mod picking;
pub mod returns;
pub mod transfers;

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::fulfillment::FulfillmentPlatform;
use crate::models::location::LocationType;
use crate::notifications::{NotificationService, Notifier};
use crate::services::{
    allocation::AllocationService, cycle_counts::CycleCountService, inventory::InventoryService,
    master_data::CatalogService, orders::OrderService, picking::PickingService,
    returns::ReturnService, transfers::TransferService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Workflow knobs read from configuration.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowSettings {
    pub count_tolerance: Decimal,
    pub restock_location_type: LocationType,
}

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub inventory: Arc<InventoryService>,
    pub transfers: Arc<TransferService>,
    pub allocation: Arc<AllocationService>,
    pub picking: Arc<PickingService>,
    pub orders: Arc<OrderService>,
    pub cycle_counts: Arc<CycleCountService>,
    pub returns: Arc<ReturnService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        notifications: Arc<dyn NotificationService>,
        fulfillment: Arc<dyn FulfillmentPlatform>,
        settings: WorkflowSettings,
    ) -> Self {
        let notifier = Notifier::new(notifications);

        let allocation = AllocationService::new(
            db_pool.clone(),
            event_sender.clone(),
            settings.count_tolerance,
        );
        let picking = PickingService::new(db_pool.clone(), event_sender.clone(), notifier.clone());
        let orders = OrderService::new(
            db_pool.clone(),
            event_sender.clone(),
            allocation.clone(),
            picking.clone(),
            fulfillment,
        );

        Self {
            catalog: Arc::new(CatalogService::new(db_pool.clone())),
            inventory: Arc::new(InventoryService::new(db_pool.clone(), event_sender.clone())),
            transfers: Arc::new(TransferService::new(
                db_pool.clone(),
                event_sender.clone(),
                notifier.clone(),
            )),
            allocation: Arc::new(allocation),
            picking: Arc::new(picking),
            orders: Arc::new(orders),
            cycle_counts: Arc::new(CycleCountService::new(
                db_pool.clone(),
                event_sender.clone(),
                notifier.clone(),
                settings.count_tolerance,
            )),
            returns: Arc::new(ReturnService::new(
                db_pool,
                event_sender,
                notifier,
                settings.restock_location_type,
            )),
        }
    }
}

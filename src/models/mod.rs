//! sea-orm entities for the warehouse schema.
//!
//! Every status column is a closed enum implementing [`StatusTransition`];
//! workflows move records between statuses only through
//! [`StatusTransition::transition_to`].

use std::fmt;

use crate::errors::ServiceError;

// Master data
pub mod location;
pub mod product_variant;

// Inventory
pub mod backorder;
pub mod inventory;
pub mod inventory_allocation;
pub mod inventory_transaction;
pub mod inventory_transfer;

// Orders
pub mod audit_event;
pub mod order;
pub mod order_item;
pub mod order_status_history;
pub mod pending_sync;

// Cycle counts
pub mod cycle_count_campaign;
pub mod cycle_count_task;

// Pick and pack
pub mod fulfillment_event;
pub mod pick_list;
pub mod pick_list_item;
pub mod task_item;
pub mod work_task;

// Returns
pub mod return_event;
pub mod return_item;
pub mod return_order;

/// A status enum with an explicit table of allowed moves.
pub trait StatusTransition: Copy + PartialEq + fmt::Display + 'static {
    /// Name used in error messages, e.g. "Order".
    const ENTITY: &'static str;

    fn allowed_transitions(self) -> &'static [Self];

    fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    fn can_transition_to(self, next: Self) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Returns `next` when the move is in the table, an invalid-status error otherwise.
    fn transition_to(self, next: Self) -> Result<Self, ServiceError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ServiceError::InvalidStatus(format!(
                "{} cannot move from {} to {}",
                Self::ENTITY,
                self,
                next
            )))
        }
    }
}

// Cross-cutting writers
pub mod audit;

// Inventory and master data
pub mod inventory;
pub mod master_data;
pub mod transfers;

// Order workflows
pub mod allocation;
pub mod orders;
pub mod picking;

// Cycle counts
pub mod cycle_counts;

// Returns
pub mod returns;

use chrono::Utc;
use uuid::Uuid;

/// Human-facing document number: `{prefix}-YYYYMMDD-XXXXXXXX`.
pub fn generate_number(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("{}-{}-{}", prefix, Utc::now().format("%Y%m%d"), suffix)
}

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Warehouse API",
        version = "1.0.0",
        description = r#"
# Warehouse Operations API

Order allocation, cycle counting, pick/pack, transfers and returns for a
multi-location warehouse.

## Authentication

Every `/api/v1` route requires a bearer token:

```
Authorization: Bearer <your-jwt-token>
```

Approval routes (transfers, returns, variances, campaign completion and
assignments) require the `MANAGER` or `ADMIN` role.

## Error Handling

Failures return a JSON body with the most specific message available:

```json
{
  "error": "Insufficient stock: Only 3 units available at the source location",
  "status": 400,
  "reason": "Bad Request",
  "request_id": "req-abc123",
  "timestamp": "2026-01-01T00:00:00Z"
}
```
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Orders", description = "Order intake, allocation and fulfilment"),
        (name = "Inventory", description = "Stock levels, receipts and the ledger"),
        (name = "Transfers", description = "Location-to-location stock moves"),
        (name = "Cycle Counts", description = "Count campaigns and variance review"),
        (name = "Picking", description = "Pick lists and pick/pack tasks"),
        (name = "Returns", description = "RMA processing, restock and refunds"),
        (name = "Master Data", description = "Locations and product variants")
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::get_order,
        crate::handlers::orders::order_history,
        crate::handlers::orders::order_action,

        crate::handlers::inventory::list_inventory,
        crate::handlers::inventory::receive_stock,
        crate::handlers::inventory::list_transactions,

        crate::handlers::transfers::create_transfer,
        crate::handlers::transfers::list_pending_transfers,
        crate::handlers::transfers::approve_transfer,
        crate::handlers::transfers::reject_transfer,

        crate::handlers::cycle_counts::create_cycle_count,
        crate::handlers::cycle_counts::get_cycle_count,
        crate::handlers::cycle_counts::record_count,
        crate::handlers::cycle_counts::complete_cycle_count,
        crate::handlers::cycle_counts::escalate_recount,
        crate::handlers::cycle_counts::approve_variance,

        crate::handlers::picking::get_pick_list,
        crate::handlers::picking::assign_pick_list,
        crate::handlers::picking::pick_item,
        crate::handlers::picking::create_packing_task,
        crate::handlers::picking::create_picking_task,
        crate::handlers::picking::get_task,
        crate::handlers::picking::assign_task,
        crate::handlers::picking::complete_task_item,

        crate::handlers::returns::create_return,
        crate::handlers::returns::get_return,
        crate::handlers::returns::approve_return,
        crate::handlers::returns::reject_return,
        crate::handlers::returns::receive_return,
        crate::handlers::returns::inspect_return,
        crate::handlers::returns::restock_return,
        crate::handlers::returns::process_refund,

        crate::handlers::master_data::create_location,
        crate::handlers::master_data::create_variant,
    ),
    components(
        schemas(
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::CreateOrderItemRequest,
            crate::services::orders::OrderAction,
            crate::services::orders::OrderActionRequest,
            crate::services::allocation::AllocationMode,
            crate::services::allocation::Shortage,

            crate::services::inventory::ReceiveStockRequest,
            crate::services::transfers::CreateTransferRequest,
            crate::services::transfers::RejectTransferRequest,

            crate::services::cycle_counts::CreateCycleCountRequest,
            crate::services::cycle_counts::RecordCountRequest,
            crate::services::cycle_counts::RecountRequest,
            crate::models::cycle_count_task::CountTaskStatus,

            crate::services::picking::AssignRequest,
            crate::services::picking::PickItemRequest,
            crate::services::picking::CreateTaskRequest,
            crate::services::picking::CompleteTaskItemRequest,

            crate::services::returns::CreateReturnRequest,
            crate::services::returns::ReturnLineRequest,
            crate::services::returns::RejectReturnRequest,
            crate::services::returns::ReceiveReturnRequest,
            crate::services::returns::ReceivedLine,
            crate::services::returns::InspectReturnRequest,
            crate::services::returns::InspectedLine,
            crate::models::return_item::ItemCondition,

            crate::services::master_data::CreateLocationRequest,
            crate::services::master_data::CreateVariantRequest,
            crate::models::location::LocationType,

            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_workflow_routes() {
        let json = ApiDocV1::openapi().to_json().unwrap();
        assert!(json.contains("Warehouse API"));
        assert!(json.contains("/api/v1/orders/actions"));
        assert!(json.contains("/api/v1/inventory/cycle-counts/{id}/count"));
        assert!(json.contains("/api/v1/pick-lists/{id}/items/{item_id}/pick"));
        assert!(json.contains("/api/v1/returns/{rma}/process-refund"));
        assert!(json.contains("ALLOCATE_WITH_COUNT"));
    }
}

//! OpenAPI / Swagger UI documentation.
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::OpenApi;

use crate::domain::{
    Bill, Expense, ExpenseItem, ExpenseItemParticipant, ExpenseParticipant, Member, Operation, OpType,
    OperationPayload, SettledTransfer,
};
use crate::settlement::{MemberBalance, SettlementResult, TransferDto};
use crate::sync::dto::{
    ConflictInfo, DeltaSyncRequest, DeltaSyncResponse, ExpenseUpsert, IdMappings, ItemUpsert, MemberUpsert,
    SubmitOperationRequest, SubmitOperationResponse, SyncBillRequest, SyncBillResponse, ToggleSettlementRequest,
};

use super::handlers::health::HealthResponse;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "SnapSplit Sync API",
        version = "1.0.0",
        description = "Collaborative bill-splitting sync and settlement engine.",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health::health_check,
        crate::gateway::handlers::sync::bulk_sync,
        crate::gateway::handlers::delta::delta_sync,
        crate::gateway::handlers::operations::submit_operation,
        crate::gateway::handlers::operations::operations_since,
        crate::gateway::handlers::settlement::get_settlement,
        crate::gateway::handlers::settlement::toggle_settlement,
    ),
    components(
        schemas(
            HealthResponse,
            Bill,
            Member,
            Expense,
            ExpenseItem,
            ExpenseParticipant,
            ExpenseItemParticipant,
            SettledTransfer,
            Operation,
            OpType,
            OperationPayload,
            MemberBalance,
            TransferDto,
            SettlementResult,
            MemberUpsert,
            ExpenseUpsert,
            ItemUpsert,
            IdMappings,
            ConflictInfo,
            SyncBillRequest,
            SyncBillResponse,
            DeltaSyncRequest,
            DeltaSyncResponse,
            SubmitOperationRequest,
            SubmitOperationResponse,
            ToggleSettlementRequest,
        )
    ),
    tags(
        (name = "Sync", description = "Bulk and delta synchronization"),
        (name = "Operations", description = "Fine-grained CRDT operation log"),
        (name = "Settlement", description = "Balance computation and transfer settlement"),
        (name = "System", description = "Health checks"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_spec_generates() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "SnapSplit Sync API");
        assert_eq!(spec.info.version, "1.0.0");
    }

    #[test]
    fn openapi_json_serializable() {
        let spec = ApiDoc::openapi();
        let json = spec.to_json();
        assert!(json.is_ok());
        assert!(json.unwrap().contains("SnapSplit Sync API"));
    }

    #[test]
    fn sync_paths_registered() {
        let spec = ApiDoc::openapi();
        let paths = spec.paths;
        assert!(paths.paths.contains_key("/bills/sync"));
        assert!(paths.paths.contains_key("/bills/{id}/delta-sync"));
        assert!(paths.paths.contains_key("/bills/{id}/settlement"));
    }
}

//! `GET /bills/{id}/settlement` and `POST /bills/{id}/settlements/toggle`.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::auth::AuthContext;
use crate::domain::{BillId, OpType, OperationPayload};
use crate::error::AppError;
use crate::gateway::extract::Caller;
use crate::gateway::state::AppState;
use crate::gateway::types::{ok, ApiError, ApiResult};
use crate::settlement::SettlementCalculator;
use crate::sync::dto::{SubmitOperationRequest, SubmitOperationResponse, ToggleSettlementRequest};

/// Compute per-member balances and the minimal transfer set.
///
/// GET /bills/{id}/settlement
#[utoipa::path(
    get,
    path = "/bills/{id}/settlement",
    params(("id" = uuid::Uuid, Path, description = "Bill id")),
    responses((status = 200, description = "Settlement result", body = crate::settlement::SettlementResult)),
    tag = "Settlement"
)]
pub async fn get_settlement(
    State(state): State<Arc<AppState>>,
    Path(bill_id): Path<BillId>,
) -> ApiResult<crate::settlement::SettlementResult> {
    let bill = state.store.find_bill(bill_id).await?.ok_or(AppError::BillNotFound)?;
    let settled: HashSet<(crate::domain::MemberId, crate::domain::MemberId)> =
        bill.settled_transfers.iter().map(|t| (t.from_member_id, t.to_member_id)).collect();
    ok(SettlementCalculator::compute(&bill, &settled))
}

/// Toggle a transfer's settled status. Gated by the owner/participant
/// predicate — unlike sync and the operation log, this mutates a
/// real-world settlement record rather than the shared document state.
///
/// POST /bills/{id}/settlements/toggle
#[utoipa::path(
    post,
    path = "/bills/{id}/settlements/toggle",
    params(("id" = uuid::Uuid, Path, description = "Bill id")),
    request_body = ToggleSettlementRequest,
    responses(
        (status = 200, description = "Toggled"),
        (status = 403, description = "Caller is neither owner nor participant"),
        (status = 409, description = "Version conflict"),
    ),
    tag = "Settlement"
)]
pub async fn toggle_settlement(
    State(state): State<Arc<AppState>>,
    Path(bill_id): Path<BillId>,
    Caller(caller): Caller,
    Json(request): Json<ToggleSettlementRequest>,
) -> ApiResult<SubmitOperationResponse> {
    let bill = state.store.find_bill(bill_id).await?.ok_or(AppError::BillNotFound)?;

    let auth = AuthContext::new();
    if !auth.is_owner_or_participant(&bill, caller) {
        return Err(ApiError::from(AppError::Unauthorized));
    }

    let already_settled = bill
        .settled_transfers
        .iter()
        .any(|t| t.from_member_id == request.from_member_id && t.to_member_id == request.to_member_id);

    let payload = if already_settled {
        OperationPayload::SettlementUnmark {
            from_member_id: request.from_member_id,
            to_member_id: request.to_member_id,
        }
    } else {
        let settled: HashSet<_> = bill.settled_transfers.iter().map(|t| (t.from_member_id, t.to_member_id)).collect();
        let result = SettlementCalculator::compute(&bill, &settled);
        let amount = result
            .transfers
            .iter()
            .find(|t| t.from_member_id == request.from_member_id && t.to_member_id == request.to_member_id)
            .map(|t| t.amount)
            .unwrap_or(rust_decimal::Decimal::ZERO);
        OperationPayload::SettlementMark {
            from_member_id: request.from_member_id,
            to_member_id: request.to_member_id,
            amount,
        }
    };

    let op_type = if already_settled { OpType::SettlementUnmark } else { OpType::SettlementMark };

    let submit_request = SubmitOperationRequest {
        base_version: bill.version,
        op_type,
        target_id: None,
        payload,
        client_id: None,
    };

    let response = state.operation_log.process_operation(bill_id, caller, submit_request).await?;

    if let SubmitOperationResponse::Accepted { ref operation } = response {
        state.notifier.notify_bill_updated(bill_id, operation.version, caller);
        state.notifier.notify_operation(bill_id, operation.clone());
    }

    ok(response)
}

//! `POST /bills/{id}/operations` and `GET /bills/{id}/operations` — the
//! fine-grained operation log endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::domain::BillId;
use crate::gateway::extract::Caller;
use crate::gateway::state::AppState;
use crate::gateway::types::{ok, ApiError, ApiResult};
use crate::sync::dto::{SubmitOperationRequest, SubmitOperationResponse};

/// Submit one typed operation against an established bill.
///
/// POST /bills/{id}/operations
///
/// A base-version mismatch does not fail the request — it returns 409 with
/// the missing operations for the caller to rebase against, per spec.md §7.
#[utoipa::path(
    post,
    path = "/bills/{id}/operations",
    params(("id" = uuid::Uuid, Path, description = "Bill id")),
    request_body = SubmitOperationRequest,
    responses(
        (status = 200, description = "Operation accepted", body = SubmitOperationResponse),
        (status = 409, description = "Version conflict, rebase payload attached"),
        (status = 404, description = "Bill not found"),
    ),
    tag = "Operations"
)]
pub async fn submit_operation(
    State(state): State<Arc<AppState>>,
    Path(bill_id): Path<BillId>,
    Caller(caller): Caller,
    Json(request): Json<SubmitOperationRequest>,
) -> Response {
    match state.operation_log.process_operation(bill_id, caller, request).await {
        Ok(accepted @ SubmitOperationResponse::Accepted { .. }) => {
            if let SubmitOperationResponse::Accepted { ref operation } = accepted {
                state.notifier.notify_bill_updated(bill_id, operation.version, caller);
                state.notifier.notify_operation(bill_id, operation.clone());
            }
            (StatusCode::OK, Json(accepted)).into_response()
        }
        Ok(conflict @ SubmitOperationResponse::Conflict { .. }) => {
            (StatusCode::CONFLICT, Json(conflict)).into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct OperationsSinceQuery {
    pub since: i64,
}

/// List operations with `version > since`, ordered.
///
/// GET /bills/{id}/operations?since=V
#[utoipa::path(
    get,
    path = "/bills/{id}/operations",
    params(
        ("id" = uuid::Uuid, Path, description = "Bill id"),
        ("since" = i64, Query, description = "Return operations with version greater than this"),
    ),
    responses((status = 200, description = "Operations since the given version")),
    tag = "Operations"
)]
pub async fn operations_since(
    State(state): State<Arc<AppState>>,
    Path(bill_id): Path<BillId>,
    Query(query): Query<OperationsSinceQuery>,
) -> ApiResult<Vec<crate::domain::Operation>> {
    let operations = state.operation_log.operations_since(bill_id, query.since).await?;
    ok(operations)
}

//! `POST /bills/{id}/delta-sync` — delta sync handler.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::domain::BillId;
use crate::gateway::extract::Caller;
use crate::gateway::state::AppState;
use crate::gateway::types::{ok, ApiResult};
use crate::sync::dto::{DeltaSyncRequest, DeltaSyncResponse};

#[utoipa::path(
    post,
    path = "/bills/{id}/delta-sync",
    params(("id" = uuid::Uuid, Path, description = "Bill id")),
    request_body = DeltaSyncRequest,
    responses(
        (status = 200, description = "Delta sync processed", body = DeltaSyncResponse),
        (status = 400, description = "Ghost member reference or invalid request"),
        (status = 404, description = "Bill not found"),
    ),
    tag = "Sync"
)]
pub async fn delta_sync(
    State(state): State<Arc<AppState>>,
    Path(bill_id): Path<BillId>,
    Caller(caller): Caller,
    Json(request): Json<DeltaSyncRequest>,
) -> ApiResult<DeltaSyncResponse> {
    let response = state.delta_sync.delta_sync(bill_id, request).await?;

    state.notifier.notify_bill_updated(bill_id, response.new_version, caller);

    ok(response)
}

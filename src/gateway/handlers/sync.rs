//! `POST /bills/sync` — bulk sync handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::gateway::extract::Caller;
use crate::gateway::state::AppState;
use crate::gateway::types::{ok, ApiResult};
use crate::sync::dto::{SyncBillRequest, SyncBillResponse};

/// Bulk sync: one-shot full-state update for long-offline clients.
///
/// POST /bills/sync
#[utoipa::path(
    post,
    path = "/bills/sync",
    request_body = SyncBillRequest,
    responses(
        (status = 200, description = "Sync accepted", body = SyncBillResponse),
        (status = 400, description = "Invalid request"),
    ),
    tag = "Sync"
)]
pub async fn bulk_sync(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Json(request): Json<SyncBillRequest>,
) -> ApiResult<SyncBillResponse> {
    let response = state.bulk_sync.bulk_sync(request, caller).await?;

    if let Ok(bill_id) = response.remote_id.parse::<uuid::Uuid>() {
        state.notifier.notify_bill_updated(bill_id.into(), response.version, caller);
    }

    ok(response)
}

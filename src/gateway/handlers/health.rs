//! Health check handler.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use utoipa::ToSchema;

use crate::gateway::state::AppState;

/// Health check response data.
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Server timestamp in milliseconds.
    pub timestamp_ms: u64,
    /// Short git commit hash this binary was built from, `-dirty` suffixed
    /// if the working tree had uncommitted changes at build time.
    pub build_version: &'static str,
}

#[derive(Serialize, ToSchema)]
pub struct UnhealthyResponse {
    pub code: &'static str,
    pub message: &'static str,
}

/// Health check endpoint.
///
/// Pings the store's backing connection (rate limited, since a Postgres
/// round trip on every call would turn a load balancer's health probe into
/// a steady trickle of extra queries).
///
/// GET /healthz
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse),
        (status = 503, description = "Storage unreachable", body = UnhealthyResponse),
    ),
    tag = "System"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    static LAST_CHECK_MS: AtomicU64 = AtomicU64::new(0);
    const CHECK_INTERVAL_MS: u64 = 5000;

    let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0);

    let last_check = LAST_CHECK_MS.load(Ordering::Relaxed);
    let healthy = if now_ms.saturating_sub(last_check) > CHECK_INTERVAL_MS {
        LAST_CHECK_MS.store(now_ms, Ordering::Relaxed);
        match state.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "health check storage ping failed");
                false
            }
        }
    } else {
        true
    };

    if healthy {
        (
            StatusCode::OK,
            Json(serde_json::json!(HealthResponse { timestamp_ms: now_ms, build_version: env!("GIT_HASH") })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!(UnhealthyResponse { code: "STORAGE_UNREACHABLE", message: "storage ping failed" })),
        )
    }
}

pub mod extract;
pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::clock::Clock;
use crate::repository::BillStore;
use state::AppState;

/// Build the router. Split out from [`run_server`] so tests can exercise
/// routes without binding a real listener.
pub fn build_router(state: Arc<AppState>) -> Router {
    let bill_routes = Router::new()
        .route("/sync", post(handlers::sync::bulk_sync))
        .route("/{id}/delta-sync", post(handlers::delta::delta_sync))
        .route(
            "/{id}/operations",
            post(handlers::operations::submit_operation).get(handlers::operations::operations_since),
        )
        .route("/{id}/settlement", get(handlers::settlement::get_settlement))
        .route("/{id}/settlements/toggle", post(handlers::settlement::toggle_settlement))
        .route("/{id}/ws", get(handlers::ws::ws_handler));

    Router::new()
        .route("/healthz", get(handlers::health::health_check))
        .nest("/bills", bill_routes)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP gateway: build shared state, assemble the router, bind
/// and serve.
pub async fn run_server(port: u16, store: Arc<dyn BillStore>, clock: Arc<dyn Clock>) {
    let state = Arc::new(AppState::new(store, clock));
    let app = build_router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind gateway listener");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "gateway listening");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "gateway server error");
        std::process::exit(1);
    }
}

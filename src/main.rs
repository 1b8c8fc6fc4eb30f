//! SnapSplit gateway entry point.

use std::sync::Arc;

use snapsplit::clock::SystemClock;
use snapsplit::config::AppConfig;
use snapsplit::gateway;
use snapsplit::logging;
use snapsplit::repository::BillStore;
use snapsplit::repository::postgres::PgBillStore;

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env();
    let _guard = logging::init_logging(&config);

    tracing::info!(port = config.port, "starting snapsplit gateway");

    let pool = match sqlx::postgres::PgPoolOptions::new().max_connections(10).connect(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to database");
            std::process::exit(1);
        }
    };

    let store: Arc<dyn BillStore> = Arc::new(PgBillStore::new(pool));
    let clock = Arc::new(SystemClock);

    gateway::run_server(config.port, store, clock).await;
}

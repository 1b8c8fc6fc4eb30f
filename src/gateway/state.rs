//! Gateway application state (shared).
//!
//! Grounded on the teacher's `gateway/state.rs` `AppState`: one `Clone`
//! struct of `Arc`-wrapped shared services, built once in `run_server` and
//! handed to every handler through axum's `State` extractor.

use std::sync::Arc;

use crate::clock::Clock;
use crate::notify::{Notifier, PushHub};
use crate::repository::BillStore;
use crate::sync::{BulkSyncEngine, DeltaSyncEngine, OperationLogEngine};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BillStore>,
    pub clock: Arc<dyn Clock>,
    pub push_hub: Arc<PushHub>,
    pub notifier: Arc<Notifier>,
    pub bulk_sync: Arc<BulkSyncEngine>,
    pub delta_sync: Arc<DeltaSyncEngine>,
    pub operation_log: Arc<OperationLogEngine>,
}

impl AppState {
    pub fn new(store: Arc<dyn BillStore>, clock: Arc<dyn Clock>) -> Self {
        let push_hub = Arc::new(PushHub::new());
        let notifier = Arc::new(Notifier::new(push_hub.clone()));
        let bulk_sync = Arc::new(BulkSyncEngine::new(store.clone(), clock.clone()));
        let delta_sync = Arc::new(DeltaSyncEngine::new(store.clone(), clock.clone()));
        let operation_log = Arc::new(OperationLogEngine::new(store.clone(), clock.clone()));

        Self { store, clock, push_hub, notifier, bulk_sync, delta_sync, operation_log }
    }
}

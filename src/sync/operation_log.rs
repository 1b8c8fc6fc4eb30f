//! Fine-grained operation log: `ProcessOperation` / `GetOperationsSince`.
//!
//! State machine of a submission: `Received -> Locked -> VersionChecked ->
//! Applied -> Committed` on success; `Received -> Locked ->
//! VersionChecked(mismatch) -> Rejected` on conflict. `VersionMismatch` is
//! never retried server-side — the caller rebases from the returned
//! operations and resubmits.

use std::sync::Arc;

use crate::clock::Clock;
use crate::domain::{Bill, BillId, Operation, OperationId};
use crate::error::AppError;
use crate::merge::SnapshotMerger;
use crate::repository::BillStore;
use crate::sync::dto::{SubmitOperationRequest, SubmitOperationResponse};

pub struct OperationLogEngine {
    store: Arc<dyn BillStore>,
    clock: Arc<dyn Clock>,
}

impl OperationLogEngine {
    pub fn new(store: Arc<dyn BillStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Submit one typed operation against `bill_id`. On a base-version
    /// mismatch, the conflict response carries every operation with
    /// `version > request.base_version` so the caller can rebase.
    pub async fn process_operation(
        &self,
        bill_id: BillId,
        actor: Option<crate::domain::UserId>,
        request: SubmitOperationRequest,
    ) -> Result<SubmitOperationResponse, AppError> {
        let base_version = request.base_version;
        let clock = self.clock.clone();

        let decide: crate::repository::OperationDecision = Box::new(move |bill: &mut Bill| {
            if bill.version != base_version {
                return Err(AppError::Conflict);
            }
            let next_version = bill.version + 1;
            let op = Operation {
                id: OperationId::new(),
                bill_id: bill.id,
                version: next_version,
                op_type: request.op_type,
                target_id: request.target_id,
                payload: request.payload,
                actor_user_id: actor,
                client_id: request.client_id,
                created_at: clock.now(),
            };
            SnapshotMerger::apply(bill, &op, clock.now());
            Ok(op)
        });

        match self.store.commit_operation(bill_id, decide).await {
            Ok((_, operation)) => Ok(SubmitOperationResponse::Accepted { operation }),
            Err(AppError::Conflict) => {
                let missing = self.store.operations_since(bill_id, base_version).await?;
                Ok(SubmitOperationResponse::Conflict { missing_operations: missing })
            }
            Err(other) => Err(other),
        }
    }

    pub async fn operations_since(&self, bill_id: BillId, since_version: i64) -> Result<Vec<Operation>, AppError> {
        self.store.operations_since(bill_id, since_version).await
    }
}

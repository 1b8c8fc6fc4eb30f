//! In-memory [`BillStore`] used by engine-level unit tests. No row
//! locking is needed since `tokio::sync::Mutex` already serializes access
//! per store instance; this stands in for `PgBillStore` without a
//! database, the same role the teacher's mock repositories play in its
//! own service-layer tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Bill, BillId, Operation, UserId};
use crate::error::AppError;
use crate::repository::{BillStore, BulkSyncMutation, DeltaSyncMutation, OperationDecision};
use crate::sync::dto::ConflictInfo;

#[derive(Default)]
pub struct InMemoryBillStore {
    bills: Mutex<HashMap<BillId, Bill>>,
    operations: Mutex<HashMap<BillId, Vec<Operation>>>,
}

impl InMemoryBillStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn local_owner_conflict(bills: &HashMap<BillId, Bill>, local_id: &str, owner: UserId) -> bool {
        bills
            .values()
            .any(|b| b.local_client_id.as_deref() == Some(local_id) && b.owner_id == Some(owner))
    }
}

#[async_trait]
impl BillStore for InMemoryBillStore {
    async fn find_bill(&self, id: BillId) -> Result<Option<Bill>, AppError> {
        Ok(self.bills.lock().await.get(&id).cloned())
    }

    async fn find_bill_by_local_owner(&self, local_id: &str, owner: UserId) -> Result<Option<Bill>, AppError> {
        let bills = self.bills.lock().await;
        Ok(bills
            .values()
            .find(|b| b.local_client_id.as_deref() == Some(local_id) && b.owner_id == Some(owner))
            .cloned())
    }

    async fn insert_bare_bill(&self, bill: &Bill) -> Result<(), AppError> {
        let mut bills = self.bills.lock().await;
        if let (Some(local_id), Some(owner)) = (&bill.local_client_id, bill.owner_id) {
            if Self::local_owner_conflict(&bills, local_id, owner) {
                return Err(AppError::Storage(
                    "duplicate key value violates unique constraint \"bills_local_owner_key\"".into(),
                ));
            }
        }
        bills.insert(bill.id, bill.clone());
        drop(bills);
        self.operations.lock().await.insert(bill.id, Vec::new());
        Ok(())
    }

    async fn operations_since(&self, bill_id: BillId, since_version: i64) -> Result<Vec<Operation>, AppError> {
        let operations = self.operations.lock().await;
        let mut ops: Vec<Operation> = operations
            .get(&bill_id)
            .map(|ops| ops.iter().filter(|op| op.version > since_version).cloned().collect())
            .unwrap_or_default();
        ops.sort_by_key(|op| op.version);
        Ok(ops)
    }

    async fn commit_operation(&self, id: BillId, decide: OperationDecision) -> Result<(Bill, Operation), AppError> {
        let mut bills = self.bills.lock().await;
        let bill = bills.get_mut(&id).ok_or(AppError::BillNotFound)?;
        let operation = decide(bill)?;
        bill.version += 1;
        let snapshot = bill.clone();
        drop(bills);

        self.operations
            .lock()
            .await
            .entry(id)
            .or_default()
            .push(operation.clone());

        Ok((snapshot, operation))
    }

    async fn commit_bulk_sync(&self, id: BillId, mutate: BulkSyncMutation) -> Result<(Bill, bool), AppError> {
        let mut bills = self.bills.lock().await;
        let bill = bills.get_mut(&id).ok_or(AppError::BillNotFound)?;
        let has_conflict = mutate(bill)?;
        bill.version += 1;
        Ok((bill.clone(), has_conflict))
    }

    async fn commit_delta_sync(&self, id: BillId, mutate: DeltaSyncMutation) -> Result<(Bill, Vec<ConflictInfo>), AppError> {
        let mut bills = self.bills.lock().await;
        let bill = bills.get_mut(&id).ok_or(AppError::BillNotFound)?;
        let conflicts = mutate(bill)?;
        bill.version += 1;
        Ok((bill.clone(), conflicts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MemberId, OpType, OperationId, OperationPayload};

    fn bare_bill() -> Bill {
        let now = chrono::Utc::now();
        Bill {
            id: BillId::new(),
            name: "Trip".into(),
            owner_id: None,
            share_code: Some("abc12345".into()),
            version: 1,
            local_client_id: None,
            members: Vec::new(),
            expenses: Vec::new(),
            settled_transfers: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_then_find_round_trips() {
        let store = InMemoryBillStore::new();
        let bill = bare_bill();
        store.insert_bare_bill(&bill).await.unwrap();
        let found = store.find_bill(bill.id).await.unwrap().unwrap();
        assert_eq!(found.id, bill.id);
    }

    #[tokio::test]
    async fn local_owner_lookup_detects_duplicate() {
        let store = InMemoryBillStore::new();
        let owner = UserId::new();
        let mut bill = bare_bill();
        bill.owner_id = Some(owner);
        bill.local_client_id = Some("local-1".into());
        store.insert_bare_bill(&bill).await.unwrap();

        let mut dup = bare_bill();
        dup.owner_id = Some(owner);
        dup.local_client_id = Some("local-1".into());
        let err = store.insert_bare_bill(&dup).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));

        let found = store.find_bill_by_local_owner("local-1", owner).await.unwrap().unwrap();
        assert_eq!(found.id, bill.id);
    }

    #[tokio::test]
    async fn commit_operation_bumps_version_and_logs() {
        let store = InMemoryBillStore::new();
        let bill = bare_bill();
        store.insert_bare_bill(&bill).await.unwrap();

        let decide: OperationDecision = Box::new(move |bill: &mut Bill| {
            let op = Operation {
                id: OperationId::new(),
                bill_id: bill.id,
                version: bill.version + 1,
                op_type: OpType::MemberAdd,
                target_id: None,
                payload: OperationPayload::MemberAdd { name: "Alice".into(), display_order: None },
                actor_user_id: None,
                client_id: None,
                created_at: chrono::Utc::now(),
            };
            bill.members.push(crate::domain::Member {
                id: MemberId::new(),
                bill_id: bill.id,
                name: "Alice".into(),
                display_order: 0,
                linked_user_id: None,
                claimed_at: None,
                original_name: None,
                local_client_id: None,
            });
            Ok(op)
        });

        let (updated, _op) = store.commit_operation(bill.id, decide).await.unwrap();
        assert_eq!(updated.version, 2);
        let ops = store.operations_since(bill.id, 1).await.unwrap();
        assert_eq!(ops.len(), 1);
    }
}

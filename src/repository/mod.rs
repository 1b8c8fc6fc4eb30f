//! Persistence abstraction for the Bill aggregate.
//!
//! `BillStore` is the seam between the sync engines and storage, grounded
//! in the teacher's `#[async_trait]` repository traits — it lets the three
//! sync flows be unit-tested against [`memory::InMemoryBillStore`] without a
//! live database, exactly the testability argument the teacher makes for
//! its own `OrderRepository` / `BalanceRepository` traits.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::domain::{Bill, BillId, Operation, UserId};
use crate::error::AppError;
use crate::sync::dto::ConflictInfo;

/// Mutates a row-locked [`Bill`] and decides the single [`Operation`] to
/// append for this call. Returning `Err` aborts the whole transaction and
/// suppresses notification.
pub type OperationDecision = Box<dyn FnOnce(&mut Bill) -> Result<Operation, AppError> + Send>;

/// Mutates a row-locked [`Bill`] for a bulk-sync request; returns whether
/// the request observed a version conflict (merge still proceeds either
/// way, per spec.md §4.4).
pub type BulkSyncMutation = Box<dyn FnOnce(&mut Bill) -> Result<bool, AppError> + Send>;

/// Mutates a row-locked [`Bill`] for a delta-sync request; returns the
/// per-field conflicts observed, if any.
pub type DeltaSyncMutation = Box<dyn FnOnce(&mut Bill) -> Result<Vec<ConflictInfo>, AppError> + Send>;

#[async_trait]
pub trait BillStore: Send + Sync {
    async fn find_bill(&self, id: BillId) -> Result<Option<Bill>, AppError>;

    async fn find_bill_by_local_owner(
        &self,
        local_id: &str,
        owner: UserId,
    ) -> Result<Option<Bill>, AppError>;

    /// Insert a fresh, empty bill row at version 1, matching spec.md §3's
    /// "version starts at 1". The first accepted sync against it bumps the
    /// version to 2.
    async fn insert_bare_bill(&self, bill: &Bill) -> Result<(), AppError>;

    async fn operations_since(&self, bill_id: BillId, since_version: i64) -> Result<Vec<Operation>, AppError>;

    /// Row-lock `id`, run `decide` against the loaded aggregate, persist the
    /// mutated aggregate plus the returned operation, and bump
    /// `bill.version` by exactly 1 — all in one transaction.
    async fn commit_operation(&self, id: BillId, decide: OperationDecision) -> Result<(Bill, Operation), AppError>;

    /// Row-lock `id`, run `mutate`, persist the mutated aggregate and bump
    /// `bill.version` by exactly 1, regardless of the returned conflict
    /// flag (bulk sync never aborts on conflict, it only flags it).
    async fn commit_bulk_sync(&self, id: BillId, mutate: BulkSyncMutation) -> Result<(Bill, bool), AppError>;

    /// Row-lock `id`, run `mutate`, persist the mutated aggregate and bump
    /// `bill.version` by exactly 1.
    async fn commit_delta_sync(
        &self,
        id: BillId,
        mutate: DeltaSyncMutation,
    ) -> Result<(Bill, Vec<ConflictInfo>), AppError>;

    /// Lightweight connectivity check for `GET /healthz`. The in-memory
    /// store is trivially always up; `PgBillStore` pings the pool.
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

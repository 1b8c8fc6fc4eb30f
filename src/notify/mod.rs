//! Post-commit fan-out: the `Notifier` (spec.md §4.8) and its transport.

pub mod events;
pub mod hub;

pub use events::{ActorLabel, PushEvent};
pub use hub::PushHub;

use std::sync::Arc;

use crate::domain::{BillId, Operation, UserId};

/// Publishes `BillUpdated`/`OperationReceived` to the hub after a commit.
/// Never called from inside the storage transaction — only after it
/// returns `Ok`, so a rollback never reaches here.
pub struct Notifier {
    hub: Arc<PushHub>,
}

impl Notifier {
    pub fn new(hub: Arc<PushHub>) -> Self {
        Self { hub }
    }

    pub fn notify_bill_updated(&self, bill_id: BillId, new_version: i64, actor: Option<UserId>) {
        self.hub.publish(
            bill_id,
            PushEvent::BillUpdated { bill_id, new_version, updated_by: ActorLabel::from(actor) },
        );
    }

    pub fn notify_operation(&self, bill_id: BillId, operation: Operation) {
        self.hub.publish(bill_id, PushEvent::OperationReceived { operation });
    }
}

//! Bill-scoped push channel registry.
//!
//! Grounded on the teacher's `ConnectionManager` (DashMap-keyed, lock-free
//! add/remove), but topic-scoped rather than per-connection: every
//! subscriber to bill `B` shares one `tokio::sync::broadcast` channel, so
//! fan-out to N watchers of the same bill is O(1) sends instead of O(N).
//! Publication failure (no subscribers) is swallowed — spec.md §4.8 says
//! the notifier treats publish failures as non-fatal.

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::domain::BillId;
use crate::notify::events::PushEvent;

const CHANNEL_CAPACITY: usize = 256;

pub struct PushHub {
    channels: DashMap<BillId, broadcast::Sender<PushEvent>>,
}

impl PushHub {
    pub fn new() -> Self {
        Self { channels: DashMap::new() }
    }

    /// Subscribe to `bill_{billId}`, creating the channel if this is the
    /// first subscriber.
    pub fn subscribe(&self, bill_id: BillId) -> broadcast::Receiver<PushEvent> {
        self.channels
            .entry(bill_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish to `bill_{billId}`. A no-op if nobody is subscribed yet —
    /// this must never be allowed to fail the caller's sync result.
    pub fn publish(&self, bill_id: BillId, event: PushEvent) {
        if let Some(sender) = self.channels.get(&bill_id) {
            let _ = sender.send(event);
        }
    }

    /// Drop a bill's channel once it has no subscribers left, so closed
    /// bills don't leak entries forever.
    pub fn reap_if_idle(&self, bill_id: BillId) {
        if let Some(sender) = self.channels.get(&bill_id) {
            if sender.receiver_count() == 0 {
                drop(sender);
                self.channels.remove(&bill_id);
            }
        }
    }

    pub fn active_channels(&self) -> usize {
        self.channels.len()
    }
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;
    use crate::notify::events::ActorLabel;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let hub = PushHub::new();
        let bill_id = BillId::new();
        let mut rx = hub.subscribe(bill_id);

        hub.publish(
            bill_id,
            PushEvent::BillUpdated { bill_id, new_version: 2, updated_by: ActorLabel::from(Some(UserId::new())) },
        );

        let received = rx.recv().await.unwrap();
        match received {
            PushEvent::BillUpdated { new_version, .. } => assert_eq!(new_version, 2),
            _ => panic!("wrong event"),
        }
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let hub = PushHub::new();
        hub.publish(
            BillId::new(),
            PushEvent::BillUpdated { bill_id: BillId::new(), new_version: 1, updated_by: ActorLabel::Anonymous },
        );
    }

    #[tokio::test]
    async fn reap_removes_idle_channel() {
        let hub = PushHub::new();
        let bill_id = BillId::new();
        {
            let _rx = hub.subscribe(bill_id);
            assert_eq!(hub.active_channels(), 1);
        }
        hub.reap_if_idle(bill_id);
        assert_eq!(hub.active_channels(), 0);
    }
}

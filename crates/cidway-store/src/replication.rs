//! Pin replication between sibling instances
//!
//! An instance that pins content may announce it on the bus; sibling
//! instances subscribed to the bus repeat the pin locally. Delivery is
//! best-effort: publishing never blocks and a slow subscriber drops
//! announcements rather than stalling the publisher.

use crate::{OwnerId, StoreError};
use bytes::Bytes;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Topic carrying pin announcements
pub const REPLICATION_TOPIC: &str = "pin-replication";

/// Default number of buffered announcements per subscriber
const DEFAULT_CAPACITY: usize = 256;

/// A pin performed by one instance, to be mirrored by the others
#[derive(Clone, Debug)]
pub struct PinAnnouncement {
    /// Instance that performed the original pin
    pub origin: Uuid,
    /// Owner of the pin
    pub owner: OwnerId,
    /// The pinned content
    pub content: Bytes,
}

/// Message channel between instances
pub trait ReplicationBus: Send + Sync {
    /// Topic name, for logs
    fn topic(&self) -> &str {
        REPLICATION_TOPIC
    }

    /// Publish an announcement, returning how many subscribers received it
    fn publish(&self, announcement: PinAnnouncement) -> Result<usize, StoreError>;

    /// Subscribe to announcements published from now on
    fn subscribe(&self) -> broadcast::Receiver<PinAnnouncement>;
}

/// In-process bus over a tokio broadcast channel.
///
/// Instances sharing one `LocalReplicationBus` behave like deployments
/// sharing a message broker.
#[derive(Clone)]
pub struct LocalReplicationBus {
    sender: broadcast::Sender<PinAnnouncement>,
}

impl Default for LocalReplicationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LocalReplicationBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Current number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl ReplicationBus for LocalReplicationBus {
    fn publish(&self, announcement: PinAnnouncement) -> Result<usize, StoreError> {
        self.sender
            .send(announcement)
            .map_err(|_| StoreError::Replication("no subscribers on replication bus".to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<PinAnnouncement> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announcement() -> PinAnnouncement {
        PinAnnouncement {
            origin: Uuid::new_v4(),
            owner: OwnerId::new("alice"),
            content: Bytes::from_static(b"hello"),
        }
    }

    #[test]
    fn test_publish_without_subscribers_fails() {
        let bus = LocalReplicationBus::default();
        assert!(matches!(
            bus.publish(announcement()),
            Err(StoreError::Replication(_))
        ));
    }

    #[tokio::test]
    async fn test_subscribers_receive_announcement() {
        let bus = LocalReplicationBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let sent = announcement();
        assert_eq!(bus.publish(sent.clone()).unwrap(), 2);

        let received = first.recv().await.unwrap();
        assert_eq!(received.origin, sent.origin);
        assert_eq!(second.recv().await.unwrap().content, sent.content);
        assert_eq!(bus.topic(), REPLICATION_TOPIC);
    }
}

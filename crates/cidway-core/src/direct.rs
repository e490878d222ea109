//! Node-backed resolution source
//!
//! `DirectSource` is the only writable source. It reads through a
//! [`ContentStore`], records ownership in a [`PinLedger`] and optionally
//! announces pins on a [`ReplicationBus`].
//!
//! Pin and unpin of the same CID are serialized inside the process by a
//! per-CID lock. Across processes sharing a ledger file, the ledger's
//! insert-if-absent and compare-and-delete primitives decide the winner:
//! [`JsonFilePinLedger`](cidway_store::JsonFilePinLedger) runs each of
//! them under a lock on the file.

use crate::{AccessError, ResolutionSource, Result, SourceFailure, SourceKind};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use cidway_store::{
    AddProgress, ByteStream, ContentId, ContentStore, DeleteOutcome, FileMetadata, LedgerError,
    OwnerId, PeerInfo, PinAnnouncement, PinLedger, PinRecord, ReplicationBus, StoreError,
};
use dashmap::DashMap;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Default bound on a single direct read
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity and connectivity of the backing node
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub id: String,
    pub addresses: Vec<String>,
    pub peers: Vec<PeerInfo>,
}

/// Per-CID async locks, removed once nobody holds or waits on them
#[derive(Default)]
struct CidLocks {
    inner: DashMap<ContentId, Arc<Mutex<()>>>,
}

impl CidLocks {
    async fn lock(&self, cid: &ContentId) -> CidGuard<'_> {
        let mutex = self.inner.entry(cid.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        CidGuard {
            locks: self,
            cid: cid.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.len()
    }
}

struct CidGuard<'a> {
    locks: &'a CidLocks,
    cid: ContentId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for CidGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map itself still references the mutex.
        self.locks
            .inner
            .remove_if(&self.cid, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Resolution source backed by a content store and a pin ledger
pub struct DirectSource {
    store: Arc<dyn ContentStore>,
    ledger: Arc<dyn PinLedger>,
    bus: Option<Arc<dyn ReplicationBus>>,
    instance_id: Uuid,
    fetch_timeout: Duration,
    locks: CidLocks,
}

impl DirectSource {
    pub fn new(store: Arc<dyn ContentStore>, ledger: Arc<dyn PinLedger>) -> Self {
        Self {
            store,
            ledger,
            bus: None,
            instance_id: Uuid::new_v4(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            locks: CidLocks::default(),
        }
    }

    /// Announce pins on `bus`
    pub fn with_bus(mut self, bus: Arc<dyn ReplicationBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Bound each read by `timeout`
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Identifier stamped on announcements from this instance
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    fn unreadable(&self, cid: &ContentId, error: StoreError) -> AccessError {
        AccessError::ContentUnavailable {
            cid: cid.clone(),
            failures: vec![SourceFailure::new(SourceKind::Direct.tag(), error)],
        }
    }

    /// Identity, addresses and peers of the backing node
    #[instrument(skip(self))]
    pub async fn status(&self) -> Result<NodeStatus> {
        let (identity, peers) = tokio::try_join!(self.store.id(), self.store.swarm_peers())
            .map_err(|e| AccessError::unavailable("backing node status unavailable", e))?;

        Ok(NodeStatus {
            id: identity.id,
            addresses: identity.addresses,
            peers,
        })
    }

    /// Store `content`, record `owner` as its pinner and optionally announce it.
    ///
    /// Pinning content already pinned by the same owner returns the
    /// existing CID. Content pinned by someone else is rejected.
    #[instrument(skip(self, content, owner), fields(size = content.len(), owner = %owner.fingerprint()))]
    pub async fn pin(&self, content: Bytes, owner: &OwnerId, broadcast: bool) -> Result<ContentId> {
        if owner.is_empty() {
            return Err(AccessError::InvalidInput("owner must not be empty".to_string()));
        }

        let cid = self
            .store
            .add(content.clone())
            .await
            .map_err(|e| AccessError::pin_failed("content injection failed", e))?;

        let created = self
            .record_pin(PinRecord::new(cid.clone(), owner.clone()))
            .await?;

        if created && broadcast {
            self.announce(&cid, owner, content);
        }

        Ok(cid)
    }

    /// Stream content into the store and record it with file metadata.
    ///
    /// The payload is never buffered, so nothing is announced.
    #[instrument(skip(self, stream, metadata, owner), fields(filename = %metadata.filename, size = metadata.size))]
    pub async fn upload_and_pin(
        &self,
        stream: ByteStream,
        metadata: FileMetadata,
        owner: &OwnerId,
    ) -> Result<ContentId> {
        if owner.is_empty() {
            return Err(AccessError::InvalidInput("owner must not be empty".to_string()));
        }

        let progress = self
            .store
            .add_stream(stream, &metadata.filename)
            .await
            .map_err(|e| AccessError::pin_failed("content injection failed", e))?;

        let cid = AddProgress::final_cid(&progress).ok_or_else(|| AccessError::PinFailed {
            reason: "store reported no CID for the upload".to_string(),
            cause: None,
        })?;

        self.record_pin(PinRecord::new(cid.clone(), owner.clone()).with_metadata(metadata))
            .await?;

        Ok(cid)
    }

    /// Write the ledger record for content the store already holds.
    ///
    /// Returns `false` when the same owner already had the pin.
    async fn record_pin(&self, record: PinRecord) -> Result<bool> {
        let cid = record.cid.clone();
        let owner = record.owner.clone();
        let _guard = self.locks.lock(&cid).await;

        let existing = self
            .ledger
            .find_by_cid(&cid)
            .await
            .map_err(|e| AccessError::pin_failed("pin ledger lookup failed", e))?;

        if let Some(existing) = existing {
            return self.already_pinned(&existing, &owner);
        }

        // An unpin that ran between `add` and taking the lock may have
        // released the backing pin.
        self.store
            .pin_add(&cid)
            .await
            .map_err(|e| AccessError::pin_failed("content injection failed", e))?;

        match self.ledger.create(record).await {
            Ok(record) => {
                info!(cid = %record.cid, owner = %owner.fingerprint(), "Content pinned");
                Ok(true)
            }
            Err(LedgerError::AlreadyExists(existing)) => self.already_pinned(&existing, &owner),
            Err(e) => {
                warn!(cid = %cid, error = %e, "Content stored but pin record not written; content stays pinned");
                Err(AccessError::pin_failed("pin ledger write failed", e))
            }
        }
    }

    fn already_pinned(&self, existing: &PinRecord, owner: &OwnerId) -> Result<bool> {
        if existing.is_owned_by(owner) {
            debug!(cid = %existing.cid, "Content already pinned by this owner");
            Ok(false)
        } else {
            Err(AccessError::PinFailed {
                reason: format!("{} is already pinned by another owner", existing.cid),
                cause: None,
            })
        }
    }

    fn announce(&self, cid: &ContentId, owner: &OwnerId, content: Bytes) {
        let Some(bus) = &self.bus else {
            return;
        };

        let announcement = PinAnnouncement {
            origin: self.instance_id,
            owner: owner.clone(),
            content,
        };

        match bus.publish(announcement) {
            Ok(receivers) => debug!(cid = %cid, receivers, topic = bus.topic(), "Pin announced"),
            Err(e) => warn!(cid = %cid, error = %e, topic = bus.topic(), "Failed to announce pin"),
        }
    }

    /// Remove `owner`'s pin on `cid`.
    ///
    /// The backing pin goes first; if the node refuses, the record stays so
    /// the caller can retry.
    #[instrument(skip(self, cid, owner), fields(cid = %cid, owner = %owner.fingerprint()))]
    pub async fn unpin(&self, cid: &ContentId, owner: &OwnerId) -> Result<bool> {
        if cid.is_empty() {
            return Err(AccessError::InvalidInput("cid must not be empty".to_string()));
        }

        let _guard = self.locks.lock(cid).await;

        let record = self
            .ledger
            .find_by_cid(cid)
            .await
            .map_err(|e| AccessError::unavailable("pin ledger lookup failed", e))?
            .ok_or_else(|| AccessError::NotFound(cid.clone()))?;

        if !record.is_owned_by(owner) {
            warn!(cid = %cid, "Unpin refused: caller does not own the pin");
            return Err(AccessError::Unauthorized { cid: cid.clone() });
        }

        self.store
            .pin_rm(cid)
            .await
            .map_err(|e| AccessError::unavailable(format!("backing node could not unpin {}", cid), e))?;

        let outcome = self
            .ledger
            .delete_if_owner(cid, owner)
            .await
            .map_err(|e| AccessError::unavailable("pin ledger delete failed", e))?;

        match outcome {
            DeleteOutcome::Deleted(_) => {
                info!(cid = %cid, "Content unpinned");
                Ok(true)
            }
            DeleteOutcome::NotFound => Err(AccessError::NotFound(cid.clone())),
            DeleteOutcome::OwnerMismatch => Err(AccessError::Unauthorized { cid: cid.clone() }),
        }
    }

    /// Records owned by `owner`, newest first
    pub async fn list_pins(&self, owner: &OwnerId) -> Result<Vec<PinRecord>> {
        self.ledger
            .list_by_owner(owner)
            .await
            .map_err(|e| AccessError::unavailable("pin ledger query failed", e))
    }

    /// Mirror a pin announced by another instance.
    ///
    /// Announcements from this instance are ignored. Mirrored pins are never
    /// re-announced.
    pub async fn apply_announcement(&self, announcement: PinAnnouncement) -> Result<Option<ContentId>> {
        if announcement.origin == self.instance_id {
            return Ok(None);
        }
        self.pin(announcement.content, &announcement.owner, false)
            .await
            .map(Some)
    }
}

#[async_trait]
impl ResolutionSource for DirectSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Direct
    }

    #[instrument(skip(self, cid), fields(cid = %cid))]
    async fn fetch(&self, cid: &ContentId) -> Result<Bytes> {
        if cid.is_empty() {
            return Err(AccessError::InvalidInput("cid must not be empty".to_string()));
        }

        let read = async {
            let mut stream = self.store.cat(cid).await?;
            let mut buffer = BytesMut::new();
            while let Some(chunk) = stream.next().await {
                buffer.extend_from_slice(&chunk?);
            }
            Ok::<_, StoreError>(buffer.freeze())
        };

        match tokio::time::timeout(self.fetch_timeout, read).await {
            Ok(Ok(bytes)) => {
                debug!(size = bytes.len(), "Read content from node");
                Ok(bytes)
            }
            Ok(Err(e)) => Err(self.unreadable(cid, e)),
            Err(_) => Err(self.unreadable(
                cid,
                StoreError::Timeout {
                    seconds: self.fetch_timeout.as_secs(),
                },
            )),
        }
    }
}

/// Mirror pins announced by sibling instances into `direct`.
///
/// The subscription is taken before the task starts, so announcements
/// published after this call returns are never missed. The task ends when
/// the bus closes.
pub fn spawn_replication_listener(
    direct: Arc<DirectSource>,
    bus: Arc<dyn ReplicationBus>,
) -> JoinHandle<()> {
    let mut receiver = bus.subscribe();
    let topic = bus.topic().to_string();

    tokio::spawn(async move {
        info!(topic = %topic, instance = %direct.instance_id(), "Replication listener started");
        loop {
            match receiver.recv().await {
                Ok(announcement) => {
                    let owner = announcement.owner.fingerprint();
                    match direct.apply_announcement(announcement).await {
                        Ok(Some(cid)) => info!(cid = %cid, owner = %owner, "Replicated pin"),
                        Ok(None) => {}
                        Err(e) => warn!(owner = %owner, error = %e, "Failed to replicate pin"),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(topic = %topic, skipped, "Replication listener lagged; announcements dropped");
                }
                Err(RecvError::Closed) => {
                    debug!(topic = %topic, "Replication bus closed");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use cidway_store::{
        LocalReplicationBus, MemoryContentStore, MemoryPinLedger, NodeIdentity,
    };
    use futures::stream;

    fn direct_with(store: MemoryContentStore) -> (DirectSource, MemoryPinLedger) {
        let ledger = MemoryPinLedger::new();
        let direct = DirectSource::new(Arc::new(store), Arc::new(ledger.clone()));
        (direct, ledger)
    }

    /// Ledger whose writes always fail
    struct BrokenLedger;

    #[async_trait]
    impl PinLedger for BrokenLedger {
        async fn create(&self, _record: PinRecord) -> std::result::Result<PinRecord, LedgerError> {
            Err(LedgerError::Backend("disk full".to_string()))
        }

        async fn find_by_cid(
            &self,
            _cid: &ContentId,
        ) -> std::result::Result<Option<PinRecord>, LedgerError> {
            Ok(None)
        }

        async fn delete_if_owner(
            &self,
            _cid: &ContentId,
            _owner: &OwnerId,
        ) -> std::result::Result<DeleteOutcome, LedgerError> {
            Err(LedgerError::Backend("disk full".to_string()))
        }

        async fn list_by_owner(
            &self,
            _owner: &OwnerId,
        ) -> std::result::Result<Vec<PinRecord>, LedgerError> {
            Err(LedgerError::Backend("disk full".to_string()))
        }
    }

    /// Store whose reads never finish
    struct StalledStore(MemoryContentStore);

    #[async_trait]
    impl ContentStore for StalledStore {
        async fn cat(&self, _cid: &ContentId) -> cidway_store::Result<ByteStream> {
            Ok(stream::pending().boxed())
        }

        async fn add(&self, data: Bytes) -> cidway_store::Result<ContentId> {
            self.0.add(data).await
        }

        async fn add_stream(
            &self,
            stream: ByteStream,
            filename: &str,
        ) -> cidway_store::Result<Vec<AddProgress>> {
            self.0.add_stream(stream, filename).await
        }

        async fn pin_add(&self, cid: &ContentId) -> cidway_store::Result<()> {
            self.0.pin_add(cid).await
        }

        async fn pin_rm(&self, cid: &ContentId) -> cidway_store::Result<()> {
            self.0.pin_rm(cid).await
        }

        async fn id(&self) -> cidway_store::Result<NodeIdentity> {
            self.0.id().await
        }

        async fn swarm_peers(&self) -> cidway_store::Result<Vec<PeerInfo>> {
            self.0.swarm_peers().await
        }
    }

    /// Store that is unreachable for its first `add`, then recovers
    struct RecoveringStore {
        inner: MemoryContentStore,
        failed: std::sync::atomic::AtomicBool,
    }

    impl RecoveringStore {
        fn new(inner: MemoryContentStore) -> Self {
            Self {
                inner,
                failed: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ContentStore for RecoveringStore {
        async fn cat(&self, cid: &ContentId) -> cidway_store::Result<ByteStream> {
            self.inner.cat(cid).await
        }

        async fn add(&self, data: Bytes) -> cidway_store::Result<ContentId> {
            if !self.failed.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return Err(StoreError::Offline("node restarting".to_string()));
            }
            self.inner.add(data).await
        }

        async fn add_stream(
            &self,
            stream: ByteStream,
            filename: &str,
        ) -> cidway_store::Result<Vec<AddProgress>> {
            self.inner.add_stream(stream, filename).await
        }

        async fn pin_add(&self, cid: &ContentId) -> cidway_store::Result<()> {
            self.inner.pin_add(cid).await
        }

        async fn pin_rm(&self, cid: &ContentId) -> cidway_store::Result<()> {
            self.inner.pin_rm(cid).await
        }

        async fn id(&self) -> cidway_store::Result<NodeIdentity> {
            self.inner.id().await
        }

        async fn swarm_peers(&self) -> cidway_store::Result<Vec<PeerInfo>> {
            self.inner.swarm_peers().await
        }
    }

    #[tokio::test]
    async fn test_pin_then_fetch() {
        let (direct, ledger) = direct_with(MemoryContentStore::new());
        let owner = OwnerId::new("alice");

        let cid = direct
            .pin(Bytes::from_static(b"hello"), &owner, false)
            .await
            .unwrap();

        assert_eq!(direct.fetch(&cid).await.unwrap(), Bytes::from_static(b"hello"));
        let record = ledger.find_by_cid(&cid).await.unwrap().unwrap();
        assert_eq!(record.owner, owner);
    }

    #[tokio::test]
    async fn test_fetch_empty_cid_is_invalid() {
        let (direct, _) = direct_with(MemoryContentStore::new());
        let err = direct.fetch(&ContentId::new("  ")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_fetch_missing_content_is_unavailable() {
        let (direct, _) = direct_with(MemoryContentStore::new());
        let err = direct.fetch(&ContentId::new("bafymissing")).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ContentUnavailable);
        assert_eq!(err.failures()[0].source_name, "direct");
        assert!(matches!(err.failures()[0].error, StoreError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_times_out() {
        let store = StalledStore(MemoryContentStore::new());
        let direct = DirectSource::new(Arc::new(store), Arc::new(MemoryPinLedger::new()))
            .with_fetch_timeout(Duration::from_secs(2));

        let err = direct.fetch(&ContentId::new("bafyslow")).await.unwrap_err();
        assert!(matches!(
            err.failures()[0].error,
            StoreError::Timeout { seconds: 2 }
        ));
    }

    #[tokio::test]
    async fn test_repin_same_owner_is_idempotent() {
        let (direct, ledger) = direct_with(MemoryContentStore::new());
        let owner = OwnerId::new("alice");

        let first = direct.pin(Bytes::from_static(b"twice"), &owner, false).await.unwrap();
        let created_at = ledger.find_by_cid(&first).await.unwrap().unwrap().created_at;

        let second = direct.pin(Bytes::from_static(b"twice"), &owner, false).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            ledger.find_by_cid(&first).await.unwrap().unwrap().created_at,
            created_at
        );
    }

    #[tokio::test]
    async fn test_repin_other_owner_fails() {
        let (direct, ledger) = direct_with(MemoryContentStore::new());
        let cid = direct
            .pin(Bytes::from_static(b"mine"), &OwnerId::new("alice"), false)
            .await
            .unwrap();

        let err = direct
            .pin(Bytes::from_static(b"mine"), &OwnerId::new("bob"), false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PinFailed);

        let record = ledger.find_by_cid(&cid).await.unwrap().unwrap();
        assert_eq!(record.owner.as_str(), "alice");
    }

    #[tokio::test]
    async fn test_ledger_failure_is_pin_failed() {
        let store = MemoryContentStore::new();
        let direct = DirectSource::new(Arc::new(store.clone()), Arc::new(BrokenLedger));

        let err = direct
            .pin(Bytes::from_static(b"orphan"), &OwnerId::new("alice"), false)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PinFailed);
        // Not rolled back
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_pin_requires_owner() {
        let (direct, _) = direct_with(MemoryContentStore::new());
        let err = direct
            .pin(Bytes::from_static(b"x"), &OwnerId::new(""), false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_unpin_checks_owner() {
        let store = MemoryContentStore::new();
        let (direct, ledger) = direct_with(store.clone());
        let alice = OwnerId::new("alice");
        let cid = direct.pin(Bytes::from_static(b"guarded"), &alice, false).await.unwrap();

        let err = direct.unpin(&cid, &OwnerId::new("bob")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(store.contains(&cid));

        assert!(direct.unpin(&cid, &alice).await.unwrap());
        assert!(ledger.find_by_cid(&cid).await.unwrap().is_none());
        assert!(!store.contains(&cid));

        let err = direct.unpin(&cid, &alice).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_locks_are_released() {
        let (direct, _) = direct_with(MemoryContentStore::new());
        let owner = OwnerId::new("alice");
        let cid = direct.pin(Bytes::from_static(b"lock"), &owner, false).await.unwrap();
        direct.unpin(&cid, &owner).await.unwrap();

        assert_eq!(direct.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_status_reports_identity() {
        let (direct, _) = direct_with(MemoryContentStore::new());
        let status = direct.status().await.unwrap();

        assert!(status.id.starts_with("memory-"));
        assert!(status.peers.is_empty());
    }

    #[tokio::test]
    async fn test_status_offline_is_unavailable() {
        let store = MemoryContentStore::new();
        store.set_offline(true);
        let (direct, _) = direct_with(store);

        let err = direct.status().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_upload_and_pin_records_metadata() {
        let (direct, ledger) = direct_with(MemoryContentStore::new());
        let chunks: Vec<cidway_store::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"col1,col2\n")),
            Ok(Bytes::from_static(b"1,2\n")),
        ];
        let metadata = FileMetadata {
            filename: "table.csv".to_string(),
            mimetype: "text/csv".to_string(),
            size: 14,
        };

        let cid = direct
            .upload_and_pin(stream::iter(chunks).boxed(), metadata.clone(), &OwnerId::new("alice"))
            .await
            .unwrap();

        let record = ledger.find_by_cid(&cid).await.unwrap().unwrap();
        assert_eq!(record.metadata, Some(metadata));
        assert_eq!(
            direct.fetch(&cid).await.unwrap(),
            Bytes::from_static(b"col1,col2\n1,2\n")
        );
    }

    #[tokio::test]
    async fn test_broadcast_publishes_once() {
        let bus = Arc::new(LocalReplicationBus::default());
        let mut receiver = bus.subscribe();
        let (direct, _) = direct_with(MemoryContentStore::new());
        let direct = direct.with_bus(bus.clone());
        let owner = OwnerId::new("alice");

        direct.pin(Bytes::from_static(b"shared"), &owner, true).await.unwrap();
        direct.pin(Bytes::from_static(b"shared"), &owner, true).await.unwrap();

        let announcement = receiver.recv().await.unwrap();
        assert_eq!(announcement.origin, direct.instance_id());
        assert_eq!(announcement.content, Bytes::from_static(b"shared"));
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_swallowed() {
        let bus = Arc::new(LocalReplicationBus::default());
        let (direct, _) = direct_with(MemoryContentStore::new());
        let direct = direct.with_bus(bus);

        let result = direct
            .pin(Bytes::from_static(b"alone"), &OwnerId::new("alice"), true)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_own_announcements_are_ignored() {
        let (direct, ledger) = direct_with(MemoryContentStore::new());
        let announcement = PinAnnouncement {
            origin: direct.instance_id(),
            owner: OwnerId::new("alice"),
            content: Bytes::from_static(b"echo"),
        };

        assert_eq!(direct.apply_announcement(announcement).await.unwrap(), None);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_listener_continues_after_failed_replication() {
        let bus = Arc::new(LocalReplicationBus::default());
        let store = MemoryContentStore::new();
        let ledger = MemoryPinLedger::new();
        let sibling = DirectSource::new(
            Arc::new(RecoveringStore::new(store.clone())),
            Arc::new(ledger.clone()),
        );
        let listener = spawn_replication_listener(Arc::new(sibling), bus.clone());

        let origin = Uuid::new_v4();
        for content in [&b"lost"[..], &b"mirrored"[..]] {
            bus.publish(PinAnnouncement {
                origin,
                owner: OwnerId::new("alice"),
                content: Bytes::copy_from_slice(content),
            })
            .unwrap();
        }

        let pins = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let pins = ledger.list_by_owner(&OwnerId::new("alice")).await.unwrap();
                if !pins.is_empty() {
                    return pins;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(pins.len(), 1);
        assert!(store.contains(&pins[0].cid));
        assert_eq!(
            direct_fetch(&store, &pins[0].cid).await,
            Bytes::from_static(b"mirrored")
        );
        assert!(!listener.is_finished());

        listener.abort();
    }

    async fn direct_fetch(store: &MemoryContentStore, cid: &ContentId) -> Bytes {
        let (direct, _) = direct_with(store.clone());
        direct.fetch(cid).await.unwrap()
    }
}

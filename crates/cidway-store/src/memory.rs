//! In-memory content store for testing and development

use crate::{
    create_cid, AddProgress, ByteStream, ContentId, ContentStore, NodeIdentity, PeerInfo, Result,
    StoreError,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use futures::{stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Chunk size used when streaming content back out
const CAT_CHUNK_SIZE: usize = 64 * 1024;

/// An in-memory content store.
///
/// Everything added is pinned; removing a pin collects the content at once,
/// so a later `cat` fails the way a garbage-collected node would. The store
/// can be switched offline to emulate an unreachable node.
#[derive(Clone)]
pub struct MemoryContentStore {
    blocks: Arc<DashMap<ContentId, Bytes>>,
    offline: Arc<AtomicBool>,
    node_id: String,
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryContentStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self {
            blocks: Arc::new(DashMap::new()),
            offline: Arc::new(AtomicBool::new(false)),
            node_id: format!("memory-{}", uuid::Uuid::new_v4()),
        }
    }

    /// Get the number of pinned items
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Whether `cid` is currently held
    pub fn contains(&self, cid: &ContentId) -> bool {
        self.blocks.contains_key(cid)
    }

    /// Simulate the node going down or coming back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Offline(self.node_id.clone()));
        }
        Ok(())
    }

    fn insert(&self, data: Bytes) -> ContentId {
        let cid = create_cid(&data);
        self.blocks.insert(cid.clone(), data);
        cid
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn cat(&self, cid: &ContentId) -> Result<ByteStream> {
        self.ensure_online()?;

        let data = self
            .blocks
            .get(cid)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(cid.to_string()))?;

        let chunks: Vec<Result<Bytes>> = (0..data.len())
            .step_by(CAT_CHUNK_SIZE)
            .map(|start| Ok(data.slice(start..(start + CAT_CHUNK_SIZE).min(data.len()))))
            .collect();

        Ok(stream::iter(chunks).boxed())
    }

    async fn add(&self, data: Bytes) -> Result<ContentId> {
        self.ensure_online()?;
        Ok(self.insert(data))
    }

    async fn add_stream(&self, mut stream: ByteStream, filename: &str) -> Result<Vec<AddProgress>> {
        self.ensure_online()?;

        let mut buffer = BytesMut::new();
        let mut progress = Vec::new();

        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
            progress.push(AddProgress {
                name: filename.to_string(),
                bytes: Some(buffer.len() as u64),
                ..Default::default()
            });
        }

        let size = buffer.len();
        let cid = self.insert(buffer.freeze());
        progress.push(AddProgress {
            name: filename.to_string(),
            hash: Some(cid.into_string()),
            size: Some(size.to_string()),
            ..Default::default()
        });

        Ok(progress)
    }

    async fn pin_add(&self, cid: &ContentId) -> Result<()> {
        self.ensure_online()?;
        if self.blocks.contains_key(cid) {
            Ok(())
        } else {
            Err(StoreError::NotFound(cid.to_string()))
        }
    }

    async fn pin_rm(&self, cid: &ContentId) -> Result<()> {
        self.ensure_online()?;
        self.blocks.remove(cid);
        Ok(())
    }

    async fn id(&self) -> Result<NodeIdentity> {
        self.ensure_online()?;
        Ok(NodeIdentity {
            id: self.node_id.clone(),
            addresses: Vec::new(),
        })
    }

    async fn swarm_peers(&self) -> Result<Vec<PeerInfo>> {
        self.ensure_online()?;
        Ok(Vec::new())
    }
}

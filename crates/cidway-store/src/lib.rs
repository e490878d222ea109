//! # cidway Store
//!
//! Collaborator layer for the cidway content access core.
//!
//! This crate provides:
//! - **Content store contract**: `cat`, `add`, streamed `add`, `pin rm`, identity and peers
//! - **IPFS node client**: Kubo HTTP RPC implementation of the contract
//! - **Memory store**: In-process implementation for tests and development
//! - **Pin ledgers**: Ownership records keyed by CID (memory and JSON file)
//! - **Replication bus**: Broadcast of pin announcements between instances
//! - **Sniffing**: Magic-byte content type detection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              cidway-core                │
//! ├──────────────┬─────────────┬────────────┤
//! │ ContentStore │  PinLedger  │ Replication│
//! ├──────┬───────┼──────┬──────┤    Bus     │
//! │ Ipfs │Memory │Memory│ JSON │            │
//! └──────┴───────┴──────┴──────┴────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use cidway_store::{ContentStore, IpfsConfig, IpfsNodeClient};
//!
//! let node = IpfsNodeClient::new(IpfsConfig::with_url("http://localhost:5001"))?;
//! let cid = node.add(bytes::Bytes::from_static(b"hello")).await?;
//! let stream = node.cat(&cid).await?;
//! ```

pub mod cid_utils;
pub mod error;
pub mod ipfs;
pub mod ledger;
pub mod memory;
pub mod replication;
pub mod sniff;

pub use cid_utils::{create_cid, is_valid_cid, ContentId};
pub use error::{LedgerError, Result, StoreError};
pub use ipfs::{AddProgress, IpfsConfig, IpfsNodeClient, NodeIdentity, PeerInfo};
pub use ledger::{
    DeleteOutcome, FileMetadata, JsonFilePinLedger, MemoryPinLedger, OwnerId, PinLedger,
    PinRecord,
};
pub use memory::MemoryContentStore;
pub use replication::{
    LocalReplicationBus, PinAnnouncement, ReplicationBus, REPLICATION_TOPIC,
};
pub use sniff::{detect, DetectedType};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// Default per-request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default bound on a streamed upload, in seconds
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 300;

/// A stream of content chunks
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Content-addressed store backing the direct source
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Stream the content named by `cid`
    async fn cat(&self, cid: &ContentId) -> Result<ByteStream>;

    /// Add and pin a single buffer, returning its CID
    async fn add(&self, data: Bytes) -> Result<ContentId>;

    /// Add and pin streamed content.
    ///
    /// Returns every progress entry reported by the store; the last entry
    /// carrying a hash names the final CID.
    async fn add_stream(&self, stream: ByteStream, filename: &str) -> Result<Vec<AddProgress>>;

    /// Pin content the store already holds. Pinning twice is not an error.
    async fn pin_add(&self, cid: &ContentId) -> Result<()>;

    /// Remove the pin on `cid`
    async fn pin_rm(&self, cid: &ContentId) -> Result<()>;

    /// Identity of the backing node
    async fn id(&self) -> Result<NodeIdentity>;

    /// Peers currently connected to the backing node
    async fn swarm_peers(&self) -> Result<Vec<PeerInfo>>;
}

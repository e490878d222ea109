//! # cidway Core
//!
//! Content resolution over IPFS with owner-gated pinning.
//!
//! A CID (or any gateway URL carrying one) is resolved through one of two
//! sources:
//! - [`DirectSource`]: a Kubo node, with pin and unpin recorded in a
//!   [`PinLedger`](cidway_store::PinLedger) so only the pinning owner may unpin
//! - [`RemoteSource`]: public HTTP gateways raced against each other
//!
//! [`ContentAccess`] sits in front of both and picks the source per
//! operation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cidway_core::{ContentAccess, DirectSource, RemoteConfig, RemoteSource};
//! use cidway_store::{IpfsNodeClient, MemoryPinLedger, OwnerId};
//! use std::sync::Arc;
//!
//! let node = IpfsNodeClient::from_url("http://localhost:5001")?;
//! let direct = DirectSource::new(Arc::new(node), Arc::new(MemoryPinLedger::new()));
//! let remote = RemoteSource::new(RemoteConfig::new(["https://ipfs.io"]))?;
//! let access = ContentAccess::new(Some(Arc::new(direct)), Some(Arc::new(remote)))?;
//!
//! let cid = access.pin("hello".into(), &OwnerId::new("alice"), false).await?;
//! let bytes = access.get(&cid).await?;
//! ```

pub mod access;
pub mod config;
pub mod direct;
pub mod error;
pub mod extract;
pub mod fanout;
pub mod remote;
pub mod source;

pub use access::{ContentAccess, ReadPolicy};
pub use config::AccessConfig;
pub use direct::{spawn_replication_listener, DirectSource, NodeStatus, DEFAULT_FETCH_TIMEOUT};
pub use error::{AccessError, ErrorKind, Result, SourceFailure};
pub use extract::{extract_cid, extract_cid_opt, ipfs_path};
pub use fanout::{first_success, AttemptFailure, FanOutResolver};
pub use remote::{image_url, RemoteConfig, RemoteSource, DEFAULT_IMAGE_GATEWAY, IMAGE_WIDTH};
pub use source::{ParsedContent, ResolutionSource, SourceKind, TypedContent};

pub use cidway_store::{ContentId, OwnerId};

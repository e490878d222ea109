//! Pin ledger: which owner asked for which CID to be retained
//!
//! The ledger holds at most one record per CID. Two primitives carry the
//! concurrency contract:
//! - [`PinLedger::create`] inserts only when the CID is absent
//! - [`PinLedger::delete_if_owner`] removes only when the owner matches
//!
//! Both are atomic with respect to other calls on the same ledger. For
//! [`JsonFilePinLedger`] that includes handles in other processes opening
//! the same file.

use crate::{ContentId, LedgerError};
use async_trait::async_trait;
use blake3::Hasher;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Opaque identity of the caller owning a pin
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(owner: impl Into<String>) -> Self {
        Self(owner.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Stable, non-reversible tag for logs.
    ///
    /// Raw identities (often e-mail addresses or wallet keys) never reach
    /// log output; the first 16 bytes of a domain-separated BLAKE3 hash do.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Hasher::new();
        hasher.update(b"cidway:owner:");
        hasher.update(self.0.as_bytes());
        let hash = hasher.finalize();
        hex::encode(&hash.as_bytes()[..16])
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for OwnerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// File details recorded for uploaded content
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    pub mimetype: String,
    pub size: u64,
}

/// "Owner X asked for CID Y to be retained"
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRecord {
    pub cid: ContentId,
    pub owner: OwnerId,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FileMetadata>,
}

impl PinRecord {
    /// New record stamped with the current time
    pub fn new(cid: ContentId, owner: OwnerId) -> Self {
        Self {
            cid,
            owner,
            created_at: Utc::now(),
            metadata: None,
        }
    }

    /// Attach file metadata
    pub fn with_metadata(mut self, metadata: FileMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_owned_by(&self, owner: &OwnerId) -> bool {
        self.owner == *owner
    }
}

/// Result of a compare-and-delete
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The record existed, the owner matched, and it is gone
    Deleted(PinRecord),
    /// No record for the CID
    NotFound,
    /// A record exists but belongs to someone else; it was left in place
    OwnerMismatch,
}

/// Durable store of pin records keyed by CID
#[async_trait]
pub trait PinLedger: Send + Sync {
    /// Insert a record if none exists for its CID.
    ///
    /// Fails with [`LedgerError::AlreadyExists`] carrying the present record
    /// instead of overwriting it.
    async fn create(&self, record: PinRecord) -> Result<PinRecord, LedgerError>;

    /// Look up the record for a CID
    async fn find_by_cid(&self, cid: &ContentId) -> Result<Option<PinRecord>, LedgerError>;

    /// Remove the record for `cid` only if `owner` owns it
    async fn delete_if_owner(
        &self,
        cid: &ContentId,
        owner: &OwnerId,
    ) -> Result<DeleteOutcome, LedgerError>;

    /// All records belonging to `owner`, newest first
    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<PinRecord>, LedgerError>;
}

fn newest_first(mut records: Vec<PinRecord>) -> Vec<PinRecord> {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    records
}

/// In-memory ledger
#[derive(Clone, Default)]
pub struct MemoryPinLedger {
    records: Arc<DashMap<ContentId, PinRecord>>,
}

impl MemoryPinLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl PinLedger for MemoryPinLedger {
    async fn create(&self, record: PinRecord) -> Result<PinRecord, LedgerError> {
        match self.records.entry(record.cid.clone()) {
            Entry::Occupied(existing) => {
                Err(LedgerError::AlreadyExists(Box::new(existing.get().clone())))
            }
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn find_by_cid(&self, cid: &ContentId) -> Result<Option<PinRecord>, LedgerError> {
        Ok(self.records.get(cid).map(|entry| entry.value().clone()))
    }

    async fn delete_if_owner(
        &self,
        cid: &ContentId,
        owner: &OwnerId,
    ) -> Result<DeleteOutcome, LedgerError> {
        // The entry guard holds the shard lock across the check and the removal.
        match self.records.entry(cid.clone()) {
            Entry::Occupied(entry) if entry.get().is_owned_by(owner) => {
                Ok(DeleteOutcome::Deleted(entry.remove()))
            }
            Entry::Occupied(_) => Ok(DeleteOutcome::OwnerMismatch),
            Entry::Vacant(_) => Ok(DeleteOutcome::NotFound),
        }
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<PinRecord>, LedgerError> {
        let records = self
            .records
            .iter()
            .filter(|entry| entry.value().is_owned_by(owner))
            .map(|entry| entry.value().clone())
            .collect();
        Ok(newest_first(records))
    }
}

/// Ledger persisted as a JSON document on disk.
///
/// The file is the only copy of the records. Every call takes an advisory
/// lock on a sibling `.lock` file, re-reads the document and, for
/// mutations, rewrites it through a temporary sibling and a rename before
/// releasing the lock. Handles in other processes that open the same path
/// therefore observe and respect each other's records.
pub struct JsonFilePinLedger {
    path: PathBuf,
    lock_path: PathBuf,
    // Keeps this handle's own calls off the blocking pool while one waits
    // on the file lock.
    local: Mutex<()>,
}

#[derive(Clone, Copy, Debug)]
enum LockMode {
    Shared,
    Exclusive,
}

impl JsonFilePinLedger {
    /// Open the ledger at `path`, starting empty when the file is absent
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");

        let ledger = Self {
            path,
            lock_path: PathBuf::from(lock_path),
            local: Mutex::new(()),
        };

        let count = ledger
            .with_records(LockMode::Shared, |records| Ok((records.len(), false)))
            .await?;
        debug!(path = %ledger.path.display(), records = count, "Opened pin ledger");

        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `op` on the records read under the file lock.
    ///
    /// `op` returns its result and whether the records changed; changed
    /// records are written back before the lock is released.
    #[instrument(skip(self, op), fields(path = %self.path.display()))]
    async fn with_records<T, F>(&self, mode: LockMode, op: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut HashMap<ContentId, PinRecord>) -> Result<(T, bool), LedgerError>
            + Send
            + 'static,
    {
        let _local = self.local.lock().await;
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();

        tokio::task::spawn_blocking(move || {
            let lock = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)?;
            match mode {
                LockMode::Shared => FileExt::lock_shared(&lock)?,
                LockMode::Exclusive => FileExt::lock_exclusive(&lock)?,
            }

            let mut records = read_records(&path)?;
            let (output, changed) = op(&mut records)?;
            if changed {
                write_records(&path, &records)?;
            }

            // Closing the lock file releases the lock.
            drop(lock);
            Ok(output)
        })
        .await
        .map_err(|e| LedgerError::Backend(format!("ledger task failed: {}", e)))?
    }
}

fn read_records(path: &Path) -> Result<HashMap<ContentId, PinRecord>, LedgerError> {
    match std::fs::read(path) {
        Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
        Ok(bytes) => {
            let list: Vec<PinRecord> = serde_json::from_slice(&bytes)?;
            Ok(list.into_iter().map(|r| (r.cid.clone(), r)).collect())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_records(path: &Path, records: &HashMap<ContentId, PinRecord>) -> Result<(), LedgerError> {
    let mut list: Vec<&PinRecord> = records.values().collect();
    list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.cid.cmp(&b.cid)));
    let bytes = serde_json::to_vec_pretty(&list)?;

    let mut tmp = path.to_path_buf().into_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, &bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl PinLedger for JsonFilePinLedger {
    async fn create(&self, record: PinRecord) -> Result<PinRecord, LedgerError> {
        self.with_records(LockMode::Exclusive, move |records| {
            if let Some(existing) = records.get(&record.cid) {
                return Err(LedgerError::AlreadyExists(Box::new(existing.clone())));
            }
            records.insert(record.cid.clone(), record.clone());
            Ok((record, true))
        })
        .await
    }

    async fn find_by_cid(&self, cid: &ContentId) -> Result<Option<PinRecord>, LedgerError> {
        let cid = cid.clone();
        self.with_records(LockMode::Shared, move |records| {
            Ok((records.get(&cid).cloned(), false))
        })
        .await
    }

    async fn delete_if_owner(
        &self,
        cid: &ContentId,
        owner: &OwnerId,
    ) -> Result<DeleteOutcome, LedgerError> {
        let cid = cid.clone();
        let owner = owner.clone();
        self.with_records(LockMode::Exclusive, move |records| {
            match records.get(&cid) {
                None => return Ok((DeleteOutcome::NotFound, false)),
                Some(record) if !record.is_owned_by(&owner) => {
                    return Ok((DeleteOutcome::OwnerMismatch, false))
                }
                Some(_) => {}
            }
            let removed = records
                .remove(&cid)
                .ok_or_else(|| LedgerError::Backend(format!("record for {} vanished", cid)))?;
            Ok((DeleteOutcome::Deleted(removed), true))
        })
        .await
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<PinRecord>, LedgerError> {
        let owner = owner.clone();
        let records = self
            .with_records(LockMode::Shared, move |records| {
                let owned = records
                    .values()
                    .filter(|record| record.is_owned_by(&owner))
                    .cloned()
                    .collect::<Vec<_>>();
                Ok((owned, false))
            })
            .await?;
        Ok(newest_first(records))
    }
}

//! Error types for the cidway-store crate

use crate::ledger::PinRecord;
use thiserror::Error;

/// Result type alias using `StoreError`
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by content stores and gateway requests
#[derive(Error, Debug)]
pub enum StoreError {
    /// Content not found
    #[error("content not found: {0}")]
    NotFound(String),

    /// Invalid CID
    #[error("invalid CID: {0}")]
    InvalidCid(String),

    /// IPFS API error
    #[error("IPFS API error: {0}")]
    IpfsApi(String),

    /// Gateway answered with a non-success status
    #[error("gateway returned {status} for {url}")]
    Gateway { url: String, status: u16 },

    /// Connection error
    #[error("connection error: {0}")]
    Connection(String),

    /// Timeout error
    #[error("operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// HTTP error
    #[error("http error: {0}")]
    Http(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Store is not reachable
    #[error("store offline: {0}")]
    Offline(String),

    /// Replication bus error
    #[error("replication error: {0}")]
    Replication(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure raised above the store layer, kept as is
    #[error(transparent)]
    Source(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout {
                seconds: crate::DEFAULT_REQUEST_TIMEOUT_SECS,
            }
        } else if err.is_connect() {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Deserialization(err.to_string())
    }
}

/// Errors raised by pin ledgers
#[derive(Error, Debug)]
pub enum LedgerError {
    /// A record for the CID is already present
    #[error("pin record already exists for {}", .0.cid)]
    AlreadyExists(Box<PinRecord>),

    /// IO error
    #[error("ledger io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("ledger serialization error: {0}")]
    Serialization(String),

    /// Backend-specific failure
    #[error("ledger backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

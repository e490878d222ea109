//! Error taxonomy surfaced to callers of the access core

use cidway_store::{ContentId, StoreError};
use std::fmt;
use thiserror::Error;

/// Result type alias using `AccessError`
pub type Result<T> = std::result::Result<T, AccessError>;

/// Boxed underlying cause kept for diagnostics
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One failed attempt against one source
#[derive(Debug)]
pub struct SourceFailure {
    /// Source label (`direct`, or a gateway URL)
    pub source_name: String,
    /// What went wrong
    pub error: StoreError,
}

impl SourceFailure {
    pub fn new(source_name: impl Into<String>, error: StoreError) -> Self {
        Self {
            source_name: source_name.into(),
            error,
        }
    }
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source_name, self.error)
    }
}

fn summarize(failures: &[SourceFailure]) -> String {
    if failures.is_empty() {
        return "no source could be tried".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Stable tag for each error kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    ContentUnavailable,
    NotFound,
    Unauthorized,
    PinFailed,
    Unavailable,
}

/// Errors returned by sources and the access facade
#[derive(Error, Debug)]
pub enum AccessError {
    /// Empty or malformed CID or URL
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Every resolution source failed
    #[error("content unavailable for {cid}: {}", summarize(.failures))]
    ContentUnavailable {
        cid: ContentId,
        failures: Vec<SourceFailure>,
    },

    /// No pin record for the CID
    #[error("no pin record for {0}")]
    NotFound(ContentId),

    /// The caller does not own the pin
    #[error("caller does not own the pin on {cid}")]
    Unauthorized { cid: ContentId },

    /// Content injection or ledger write failed during a pin
    #[error("pin failed: {reason}")]
    PinFailed {
        reason: String,
        #[source]
        cause: Option<Cause>,
    },

    /// A required source is not configured or not reachable
    #[error("unavailable: {reason}")]
    Unavailable {
        reason: String,
        #[source]
        cause: Option<Cause>,
    },
}

impl AccessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::ContentUnavailable { .. } => ErrorKind::ContentUnavailable,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::PinFailed { .. } => ErrorKind::PinFailed,
            Self::Unavailable { .. } => ErrorKind::Unavailable,
        }
    }

    pub(crate) fn pin_failed(
        reason: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::PinFailed {
            reason: reason.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub(crate) fn unavailable(
        reason: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Unavailable {
            reason: reason.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub(crate) fn not_configured(what: &str) -> Self {
        Self::Unavailable {
            reason: format!("{} source is not configured", what),
            cause: None,
        }
    }

    /// Per-source failures carried by a `ContentUnavailable`
    pub fn failures(&self) -> &[SourceFailure] {
        match self {
            Self::ContentUnavailable { failures, .. } => failures,
            _ => &[],
        }
    }

    /// Flatten into per-source failures. Anything that is not already a
    /// `ContentUnavailable` becomes one failure labelled `source_name`
    /// carrying the original error.
    pub(crate) fn into_source_failures(self, source_name: &str) -> Vec<SourceFailure> {
        match self {
            Self::ContentUnavailable { failures, .. } => failures,
            other => vec![SourceFailure::new(
                source_name,
                StoreError::Source(Box::new(other)),
            )],
        }
    }
}

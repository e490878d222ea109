//! Resolution source contract and fetch result types

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use cidway_store::{detect, ContentId, DetectedType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The closed set of source families
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Node-backed: reads, pins, unpins and status
    Direct,
    /// Gateway-backed: reads only
    Remote,
}

impl SourceKind {
    /// Stable tag
    pub fn tag(&self) -> &'static str {
        match self {
            SourceKind::Direct => "direct",
            SourceKind::Remote => "remote",
        }
    }

    /// Whether the family supports pin and unpin
    pub fn is_writable(&self) -> bool {
        matches!(self, SourceKind::Direct)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Raw bytes with the sniffed content type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypedContent {
    pub bytes: Bytes,
    pub detected: Option<DetectedType>,
}

impl TypedContent {
    /// Run type detection over `bytes`
    pub fn sniff(bytes: Bytes) -> Self {
        let detected = detect(&bytes);
        Self { bytes, detected }
    }
}

/// Content parsed as JSON, or raw text when it is not JSON
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParsedContent {
    Json(Value),
    Text(String),
}

impl ParsedContent {
    pub fn parse(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => ParsedContent::Json(value),
            Err(_) => ParsedContent::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ParsedContent::Json(value) => Some(value),
            ParsedContent::Text(_) => None,
        }
    }
}

/// A place content can be read from
#[async_trait]
pub trait ResolutionSource: Send + Sync {
    /// Which family this source belongs to
    fn kind(&self) -> SourceKind;

    /// Label used in failure reports
    fn name(&self) -> String {
        self.kind().tag().to_string()
    }

    /// Fetch raw bytes
    async fn fetch(&self, cid: &ContentId) -> Result<Bytes>;

    /// Fetch bytes and sniff their type
    async fn fetch_typed(&self, cid: &ContentId) -> Result<TypedContent> {
        self.fetch(cid).await.map(TypedContent::sniff)
    }

    /// Fetch and parse as JSON, falling back to text
    async fn fetch_parsed(&self, cid: &ContentId) -> Result<ParsedContent> {
        let bytes = self.fetch(cid).await?;
        Ok(ParsedContent::parse(&bytes))
    }
}

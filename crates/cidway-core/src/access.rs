//! Unified access facade
//!
//! `ContentAccess` routes every operation to the source able to serve it.
//! Reads follow a [`ReadPolicy`]: an ordered list of source kinds tried one
//! after another. Writes and node status go to the direct source only,
//! metadata rewriting to the remote source only.

use crate::direct::{DirectSource, NodeStatus};
use crate::extract::extract_cid;
use crate::fanout::FanOutResolver;
use crate::remote::{image_url, RemoteSource, DEFAULT_IMAGE_GATEWAY};
use crate::{AccessError, ParsedContent, ResolutionSource, Result, SourceKind, TypedContent};
use bytes::Bytes;
use cidway_store::{ByteStream, ContentId, FileMetadata, OwnerId, PinRecord};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Order in which sources are tried for each kind of read
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadPolicy {
    /// Raw and parsed reads
    pub get: Vec<SourceKind>,
    /// Typed reads by URL
    pub get_file: Vec<SourceKind>,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self {
            get: vec![SourceKind::Direct, SourceKind::Remote],
            // Gateways serve binary payloads faster.
            get_file: vec![SourceKind::Remote, SourceKind::Direct],
        }
    }
}

/// Single entry point over the direct and remote sources
pub struct ContentAccess {
    sources: HashMap<SourceKind, Arc<dyn ResolutionSource>>,
    direct: Option<Arc<DirectSource>>,
    remote: Option<Arc<RemoteSource>>,
    policy: ReadPolicy,
}

impl ContentAccess {
    /// Build the facade. At least one source is required.
    pub fn new(direct: Option<Arc<DirectSource>>, remote: Option<Arc<RemoteSource>>) -> Result<Self> {
        let mut sources: HashMap<SourceKind, Arc<dyn ResolutionSource>> = HashMap::new();
        if let Some(direct) = &direct {
            sources.insert(SourceKind::Direct, direct.clone());
        }
        if let Some(remote) = &remote {
            sources.insert(SourceKind::Remote, remote.clone());
        }

        if sources.is_empty() {
            return Err(AccessError::InvalidInput(
                "at least one resolution source is required".to_string(),
            ));
        }

        Ok(Self {
            sources,
            direct,
            remote,
            policy: ReadPolicy::default(),
        })
    }

    /// Replace the read policy
    pub fn with_policy(mut self, policy: ReadPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Configured source kinds
    pub fn source_kinds(&self) -> Vec<SourceKind> {
        let mut kinds: Vec<_> = self.sources.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn direct_source(&self) -> Option<&Arc<DirectSource>> {
        self.direct.as_ref()
    }

    pub fn remote_source(&self) -> Option<&Arc<RemoteSource>> {
        self.remote.as_ref()
    }

    fn direct(&self) -> Result<&DirectSource> {
        self.direct
            .as_deref()
            .ok_or_else(|| AccessError::not_configured(SourceKind::Direct.tag()))
    }

    fn remote(&self) -> Result<&RemoteSource> {
        self.remote
            .as_deref()
            .ok_or_else(|| AccessError::not_configured(SourceKind::Remote.tag()))
    }

    /// Try sources in `order` until one succeeds, merging every failure
    async fn read_in_order<T, F, Fut>(&self, cid: &ContentId, order: &[SourceKind], read: F) -> Result<T>
    where
        F: Fn(Arc<dyn ResolutionSource>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if cid.is_empty() {
            return Err(AccessError::InvalidInput("cid must not be empty".to_string()));
        }

        let mut failures = Vec::new();

        for kind in order {
            let Some(source) = self.sources.get(kind) else {
                continue;
            };

            match read(source.clone()).await {
                Ok(value) => return Ok(value),
                Err(e @ AccessError::InvalidInput(_)) => return Err(e),
                Err(e) => {
                    debug!(cid = %cid, source = %kind, error = %e, "Read failed, trying next source");
                    failures.extend(e.into_source_failures(kind.tag()));
                }
            }
        }

        Err(AccessError::ContentUnavailable {
            cid: cid.clone(),
            failures,
        })
    }

    /// Raw bytes, node first
    #[instrument(skip(self, cid), fields(cid = %cid))]
    pub async fn get(&self, cid: &ContentId) -> Result<Bytes> {
        self.read_in_order(cid, &self.policy.get, |source| {
            let cid = cid.clone();
            async move { source.fetch(&cid).await }
        })
        .await
    }

    /// Typed content for a CID or gateway URL, gateways first
    #[instrument(skip(self))]
    pub async fn get_file(&self, url: &str) -> Result<TypedContent> {
        let cid = extract_cid(url)
            .ok_or_else(|| AccessError::InvalidInput("no CID in file URL".to_string()))?;

        self.read_in_order(&cid, &self.policy.get_file, |source| {
            let cid = cid.clone();
            async move { source.fetch_typed(&cid).await }
        })
        .await
    }

    /// JSON when the content parses as JSON, text otherwise
    pub async fn get_parsed(&self, cid: &ContentId) -> Result<ParsedContent> {
        self.read_in_order(cid, &self.policy.get, |source| {
            let cid = cid.clone();
            async move { source.fetch_parsed(&cid).await }
        })
        .await
    }

    /// Race every configured source
    #[instrument(skip(self, cid), fields(cid = %cid))]
    pub async fn get_fastest(&self, cid: &ContentId) -> Result<Bytes> {
        if cid.is_empty() {
            return Err(AccessError::InvalidInput("cid must not be empty".to_string()));
        }
        let resolver = FanOutResolver::new(self.sources.values().cloned().collect());
        resolver.fetch(cid).await
    }

    /// Pin content for `owner` on the node
    pub async fn pin(&self, content: Bytes, owner: &OwnerId, broadcast: bool) -> Result<ContentId> {
        self.direct()?.pin(content, owner, broadcast).await
    }

    /// Remove `owner`'s pin on `cid`
    pub async fn unpin(&self, cid: &ContentId, owner: &OwnerId) -> Result<bool> {
        self.direct()?.unpin(cid, owner).await
    }

    pub async fn status(&self) -> Result<NodeStatus> {
        self.direct()?.status().await
    }

    /// Stream a file into the node and pin it with its metadata
    pub async fn upload_and_pin(
        &self,
        stream: ByteStream,
        filename: impl Into<String>,
        mimetype: impl Into<String>,
        size: u64,
        owner: &OwnerId,
    ) -> Result<ContentId> {
        let metadata = FileMetadata {
            filename: filename.into(),
            mimetype: mimetype.into(),
            size,
        };
        self.direct()?.upload_and_pin(stream, metadata, owner).await
    }

    pub async fn list_pins(&self, owner: &OwnerId) -> Result<Vec<PinRecord>> {
        self.direct()?.list_pins(owner).await
    }

    /// Metadata document with its image rewritten for the resizing gateway
    pub async fn get_metadata(&self, encoded_url: &str) -> Result<Value> {
        self.remote()?.resolve_metadata(encoded_url).await
    }

    /// Resized-image URL for `cid`
    pub fn get_image_url(&self, cid: &ContentId) -> String {
        match &self.remote {
            Some(remote) => remote.build_image_url(cid),
            None => image_url(DEFAULT_IMAGE_GATEWAY, cid),
        }
    }
}

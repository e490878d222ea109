//! IPFS HTTP RPC client (Kubo) implementing [`ContentStore`]

use crate::{ByteStream, ContentId, ContentStore, Result, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use reqwest::{multipart, Body, Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Configuration for the IPFS node connection
#[derive(Clone, Debug)]
pub struct IpfsConfig {
    /// IPFS API URL (e.g., "http://localhost:5001")
    pub api_url: String,
    /// Timeout for connecting and for short RPC calls, including `add`
    pub timeout: Duration,
    /// Timeout for a whole streamed upload
    pub upload_timeout: Duration,
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5001".to_string(),
            timeout: Duration::from_secs(crate::DEFAULT_REQUEST_TIMEOUT_SECS),
            upload_timeout: Duration::from_secs(crate::DEFAULT_UPLOAD_TIMEOUT_SECS),
        }
    }
}

impl IpfsConfig {
    /// Create with a custom API URL
    pub fn with_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    /// Set the RPC timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the streamed upload timeout
    pub fn with_upload_timeout(mut self, upload_timeout: Duration) -> Self {
        self.upload_timeout = upload_timeout;
        self
    }
}

/// Kubo RPC client
///
/// Construction never touches the network: a node that is down at startup
/// surfaces as per-call failures.
#[derive(Clone)]
pub struct IpfsNodeClient {
    client: Client,
    config: IpfsConfig,
}

impl IpfsNodeClient {
    /// Create a new client
    pub fn new(config: IpfsConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create from URL string
    pub fn from_url(url: &str) -> Result<Self> {
        Self::new(IpfsConfig::with_url(url))
    }

    /// The configured API URL
    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }

    /// Verify connection to IPFS
    pub async fn verify_connection(&self) -> Result<()> {
        self.id()
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Connection(format!("Failed to connect to IPFS: {}", e)))
    }

    fn rpc_url(&self, command: &str) -> String {
        format!("{}/api/v0/{}", self.config.api_url, command)
    }

    async fn rpc(&self, url: &str) -> Result<Response> {
        let response = self
            .client
            .post(url)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| request_error(e, self.config.timeout))?;
        Ok(response)
    }
}

fn request_error(err: reqwest::Error, timeout: Duration) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout {
            seconds: timeout.as_secs(),
        }
    } else {
        err.into()
    }
}

async fn api_error(response: Response, action: &str) -> StoreError {
    let status = response.status();
    let error = response.text().await.unwrap_or_default();
    StoreError::IpfsApi(format!("Failed to {} ({}): {}", action, status, error))
}

#[async_trait]
impl ContentStore for IpfsNodeClient {
    #[instrument(skip(self, cid), fields(cid = %cid))]
    async fn cat(&self, cid: &ContentId) -> Result<ByteStream> {
        let url = format!(
            "{}?arg={}",
            self.rpc_url("cat"),
            urlencoding::encode(cid.as_str())
        );

        // No request timeout here: callers bound the whole read.
        let response = self.client.post(&url).send().await?;

        if !response.status().is_success() {
            if response.status().as_u16() == 404 {
                return Err(StoreError::NotFound(cid.to_string()));
            }
            return Err(api_error(response, "cat content").await);
        }

        Ok(response.bytes_stream().map_err(StoreError::from).boxed())
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn add(&self, data: Bytes) -> Result<ContentId> {
        let url = format!("{}?pin=true&cid-version=1", self.rpc_url("add"));

        let part = multipart::Part::bytes(data.to_vec())
            .file_name("data")
            .mime_str("application/octet-stream")
            .map_err(|e| StoreError::IpfsApi(e.to_string()))?;

        let form = multipart::Form::new().part("file", part);

        let timeout = self.config.timeout;
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| request_error(e, timeout))?;

        if !response.status().is_success() {
            return Err(api_error(response, "add data").await);
        }

        let added: AddProgress = response.json().await.map_err(|e| {
            if e.is_timeout() {
                request_error(e, timeout)
            } else {
                StoreError::Deserialization(e.to_string())
            }
        })?;

        added
            .hash
            .map(ContentId::new)
            .ok_or_else(|| StoreError::IpfsApi("add response carried no hash".to_string()))
    }

    #[instrument(skip(self, stream))]
    async fn add_stream(&self, stream: ByteStream, filename: &str) -> Result<Vec<AddProgress>> {
        let url = format!(
            "{}?pin=true&cid-version=1&progress=true",
            self.rpc_url("add")
        );

        let part = multipart::Part::stream(Body::wrap_stream(stream))
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| StoreError::IpfsApi(e.to_string()))?;

        let form = multipart::Form::new().part("file", part);

        let timeout = self.config.upload_timeout;
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| request_error(e, timeout))?;

        if !response.status().is_success() {
            return Err(api_error(response, "add stream").await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| request_error(e, timeout))?;
        let progress = parse_add_progress(&body)?;

        debug!(entries = progress.len(), "Streamed add completed");
        Ok(progress)
    }

    #[instrument(skip(self, cid), fields(cid = %cid))]
    async fn pin_add(&self, cid: &ContentId) -> Result<()> {
        let url = format!(
            "{}?arg={}",
            self.rpc_url("pin/add"),
            urlencoding::encode(cid.as_str())
        );

        let response = self.rpc(&url).await?;

        if !response.status().is_success() {
            return Err(api_error(response, "add pin").await);
        }

        Ok(())
    }

    #[instrument(skip(self, cid), fields(cid = %cid))]
    async fn pin_rm(&self, cid: &ContentId) -> Result<()> {
        let url = format!(
            "{}?arg={}",
            self.rpc_url("pin/rm"),
            urlencoding::encode(cid.as_str())
        );

        let response = self.rpc(&url).await?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            if error.contains("not pinned") {
                debug!(cid = %cid, "CID was not pinned on the node");
                return Ok(());
            }
            return Err(StoreError::IpfsApi(format!(
                "Failed to remove pin ({}): {}",
                status, error
            )));
        }

        Ok(())
    }

    async fn id(&self) -> Result<NodeIdentity> {
        let response = self.rpc(&self.rpc_url("id")).await?;

        if !response.status().is_success() {
            return Err(api_error(response, "get node info").await);
        }

        let info: NodeInfo = response
            .json()
            .await
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;

        Ok(NodeIdentity {
            id: info.id,
            addresses: info.addresses.unwrap_or_default(),
        })
    }

    async fn swarm_peers(&self) -> Result<Vec<PeerInfo>> {
        let response = self.rpc(&self.rpc_url("swarm/peers")).await?;

        if !response.status().is_success() {
            return Err(api_error(response, "list swarm peers").await);
        }

        let peers: SwarmPeersResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;

        Ok(peers.peers.unwrap_or_default())
    }
}

/// Parse the newline-delimited JSON emitted by `add` with progress enabled
fn parse_add_progress(body: &str) -> Result<Vec<AddProgress>> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(StoreError::from))
        .collect()
}

/// IPFS node information from `/api/v0/id`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeInfo {
    #[serde(rename = "ID")]
    id: String,
    #[serde(default)]
    addresses: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SwarmPeersResponse {
    #[serde(default)]
    peers: Option<Vec<PeerInfo>>,
}

/// Identity of the backing node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub id: String,
    pub addresses: Vec<String>,
}

/// A connected swarm peer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    #[serde(rename = "Addr")]
    pub addr: String,
    #[serde(rename = "Peer")]
    pub peer: String,
}

/// One entry of an `add` response.
///
/// Progress entries carry `bytes`; the completed entry carries `hash`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddProgress {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl AddProgress {
    /// The CID named by the last completed entry of an add response
    pub fn final_cid(progress: &[AddProgress]) -> Option<ContentId> {
        progress
            .iter()
            .rev()
            .find_map(|entry| entry.hash.as_deref().map(ContentId::from))
    }
}

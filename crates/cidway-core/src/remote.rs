//! Gateway-backed resolution source
//!
//! Reads race every configured HTTP gateway and keep the first success.
//! The source is read-only; it also rewrites NFT-style metadata documents
//! so their `image` points at a resizing gateway.

use crate::extract::extract_cid;
use crate::fanout::first_success;
use crate::{AccessError, ParsedContent, ResolutionSource, Result, SourceFailure, SourceKind};
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use bytes::Bytes;
use cidway_store::{ContentId, StoreError};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Gateway used for image URLs when none is configured
pub const DEFAULT_IMAGE_GATEWAY: &str = "https://ipfs.io";

/// Width requested from the image-optimizing gateway
pub const IMAGE_WIDTH: u32 = 800;

/// Default per-gateway request timeout
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Metadata fields that may reference the image, in lookup order
const IMAGE_FIELDS: [&str; 2] = ["image", "CID"];

/// Trim trailing slashes and a trailing `/ipfs` segment
pub fn normalize_gateway(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    url.strip_suffix("/ipfs")
        .unwrap_or(url)
        .trim_end_matches('/')
        .to_string()
}

/// Resized-image URL for `cid` on `gateway`
pub fn image_url(gateway: &str, cid: &ContentId) -> String {
    format!(
        "{}/ipfs/{}?img-width={}&img-format=auto",
        normalize_gateway(gateway),
        urlencoding::encode(cid.as_str()),
        IMAGE_WIDTH
    )
}

/// Gateway source settings
#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub gateways: Vec<String>,
    pub timeout: Duration,
    pub image_gateway: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            gateways: Vec::new(),
            timeout: DEFAULT_GATEWAY_TIMEOUT,
            image_gateway: DEFAULT_IMAGE_GATEWAY.to_string(),
        }
    }
}

impl RemoteConfig {
    /// Config racing `gateways`
    pub fn new<I, S>(gateways: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            gateways: gateways
                .into_iter()
                .map(|gw| normalize_gateway(gw.as_ref()))
                .filter(|gw| !gw.is_empty())
                .collect(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_image_gateway(mut self, gateway: impl AsRef<str>) -> Self {
        self.image_gateway = normalize_gateway(gateway.as_ref());
        self
    }
}

/// Resolution source over public HTTP gateways
#[derive(Clone)]
pub struct RemoteSource {
    client: Client,
    config: RemoteConfig,
}

impl RemoteSource {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("cidway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AccessError::unavailable("failed to build gateway client", e))?;

        Ok(Self { client, config })
    }

    pub fn gateways(&self) -> &[String] {
        &self.config.gateways
    }

    /// Resized-image URL on the configured image gateway
    pub fn build_image_url(&self, cid: &ContentId) -> String {
        image_url(&self.config.image_gateway, cid)
    }

    #[instrument(skip(self, cid), fields(cid = %cid))]
    async fn fetch_from(&self, gateway: &str, cid: &ContentId) -> std::result::Result<Bytes, StoreError> {
        let url = format!("{}/ipfs/{}", gateway, cid);

        let response = self
            .client
            .get(&url)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Gateway {
                url,
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.request_error(e))?;
        debug!(size = bytes.len(), "Gateway returned content");
        Ok(bytes)
    }

    fn request_error(&self, error: reqwest::Error) -> StoreError {
        if error.is_timeout() {
            StoreError::Timeout {
                seconds: self.config.timeout.as_secs(),
            }
        } else {
            error.into()
        }
    }

    /// Fetch the metadata document named by a base64-encoded URL and point
    /// its `image` at the resizing gateway.
    ///
    /// `image` is preferred; `CID` is the fallback. A document carrying
    /// neither is returned untouched.
    #[instrument(skip(self))]
    pub async fn resolve_metadata(&self, encoded_url: &str) -> Result<Value> {
        let url = decode_url(encoded_url)?;
        let cid = extract_cid(&url)
            .ok_or_else(|| AccessError::InvalidInput(format!("no CID in metadata URL {:?}", url)))?;

        let mut document = match self.fetch_parsed(&cid).await? {
            ParsedContent::Json(Value::Object(document)) => document,
            _ => {
                return Err(AccessError::InvalidInput(format!(
                    "metadata {} is not a JSON object",
                    cid
                )))
            }
        };

        let image = IMAGE_FIELDS.iter().find_map(|field| {
            document
                .get(*field)
                .and_then(Value::as_str)
                .filter(|value| !value.trim().is_empty())
                .map(str::to_string)
        });

        match image.as_deref().and_then(extract_cid) {
            Some(image_cid) => {
                document.insert(
                    "image".to_string(),
                    Value::String(self.build_image_url(&image_cid)),
                );
            }
            None => debug!(cid = %cid, "Metadata has no image reference"),
        }

        Ok(Value::Object(document))
    }
}

/// Decode a base64 URL, standard alphabet first
fn decode_url(encoded: &str) -> Result<String> {
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Err(AccessError::InvalidInput("metadata URL must not be empty".to_string()));
    }

    let bytes = STANDARD
        .decode(encoded)
        .or_else(|_| URL_SAFE.decode(encoded))
        .or_else(|_| URL_SAFE_NO_PAD.decode(encoded))
        .map_err(|e| AccessError::InvalidInput(format!("metadata URL is not base64: {}", e)))?;

    String::from_utf8(bytes)
        .map_err(|_| AccessError::InvalidInput("metadata URL is not UTF-8".to_string()))
}

#[async_trait]
impl ResolutionSource for RemoteSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Remote
    }

    async fn fetch(&self, cid: &ContentId) -> Result<Bytes> {
        if cid.is_empty() {
            return Err(AccessError::InvalidInput("cid must not be empty".to_string()));
        }

        let attempts = self
            .config
            .gateways
            .iter()
            .map(|gateway| (gateway.clone(), self.fetch_from(gateway, cid)));

        first_success(attempts)
            .await
            .map_err(|failures| AccessError::ContentUnavailable {
                cid: cid.clone(),
                failures: failures.into_iter().map(SourceFailure::from).collect(),
            })
    }
}

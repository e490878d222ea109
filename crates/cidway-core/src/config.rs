//! Access layer configuration

use crate::remote::{normalize_gateway, RemoteConfig, DEFAULT_IMAGE_GATEWAY};
use crate::{AccessError, Result};
use cidway_store::IpfsConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which sources exist and how they behave
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Kubo RPC endpoint; enables the direct source
    pub node_url: Option<String>,
    /// HTTP gateways; enable the remote source
    pub gateways_urls: Vec<String>,
    /// Bound on a direct read, in seconds
    pub fetch_timeout_secs: u64,
    /// Bound on one gateway request, in seconds
    pub gateway_timeout_secs: u64,
    /// Gateway used to build resized-image URLs
    pub image_gateway: String,
    /// Pin ledger file; in-memory when absent
    pub ledger_path: Option<PathBuf>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            node_url: None,
            gateways_urls: Vec::new(),
            fetch_timeout_secs: 10,
            gateway_timeout_secs: 10,
            image_gateway: DEFAULT_IMAGE_GATEWAY.to_string(),
            ledger_path: None,
        }
    }
}

impl AccessConfig {
    /// Whether a node is configured
    pub fn has_direct(&self) -> bool {
        self.node_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }

    /// Whether at least one gateway is configured
    pub fn has_remote(&self) -> bool {
        self.gateways_urls.iter().any(|url| !url.trim().is_empty())
    }

    /// Reject configurations that could never serve a request
    pub fn validate(&self) -> Result<()> {
        if !self.has_direct() && !self.has_remote() {
            return Err(AccessError::InvalidInput(
                "configure a node URL, at least one gateway, or both".to_string(),
            ));
        }
        if self.fetch_timeout_secs == 0 || self.gateway_timeout_secs == 0 {
            return Err(AccessError::InvalidInput(
                "timeouts must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Remote source settings, or `None` when no gateway is configured
    pub fn remote_config(&self) -> Option<RemoteConfig> {
        self.has_remote().then(|| {
            RemoteConfig::new(&self.gateways_urls)
                .with_timeout(Duration::from_secs(self.gateway_timeout_secs))
                .with_image_gateway(&self.image_gateway)
        })
    }

    /// Node client settings, or `None` when no node is configured
    pub fn ipfs_config(&self) -> Option<IpfsConfig> {
        let url = self.node_url.as_deref().filter(|url| !url.trim().is_empty())?;
        Some(IpfsConfig::with_url(url.trim()).with_timeout(self.fetch_timeout()))
    }

    /// Image gateway, normalized
    pub fn image_gateway(&self) -> String {
        normalize_gateway(&self.image_gateway)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AccessConfig::default();
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.image_gateway(), "https://ipfs.io");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gateways_only_is_valid() {
        let config = AccessConfig {
            gateways_urls: vec!["https://dweb.link/ipfs/".to_string()],
            ..Default::default()
        };
        config.validate().unwrap();
        assert!(config.ipfs_config().is_none());

        let remote = config.remote_config().unwrap();
        assert_eq!(remote.gateways, vec!["https://dweb.link".to_string()]);
    }

    #[test]
    fn test_blank_node_url_is_absent() {
        let config = AccessConfig {
            node_url: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(!config.has_direct());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: AccessConfig =
            serde_json::from_str(r#"{"node_url":"http://127.0.0.1:5001/"}"#).unwrap();
        assert_eq!(config.gateway_timeout_secs, 10);
        assert_eq!(
            config.ipfs_config().unwrap().api_url,
            "http://127.0.0.1:5001"
        );
    }
}

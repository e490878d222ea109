//! Application state

use cidway_core::{AccessConfig, ContentAccess, DirectSource, RemoteSource};
use cidway_store::{IpfsNodeClient, JsonFilePinLedger, MemoryPinLedger, PinLedger};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a command needs
pub struct AppState {
    pub config: AccessConfig,
    pub access: ContentAccess,
}

impl AppState {
    /// Build sources from a validated configuration.
    ///
    /// No network call is made here; an unreachable node or gateway shows
    /// up when a command uses it.
    pub async fn new(config: AccessConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let direct = match config.ipfs_config() {
            Some(ipfs_config) => {
                let node = IpfsNodeClient::new(ipfs_config)?;
                info!(api = node.api_url(), "Direct source: IPFS node");

                let ledger = Self::open_ledger(&config).await?;
                let direct = DirectSource::new(Arc::new(node), ledger)
                    .with_fetch_timeout(config.fetch_timeout());
                Some(Arc::new(direct))
            }
            None => {
                info!("No IPFS node configured; pinning is unavailable");
                None
            }
        };

        let remote = match config.remote_config() {
            Some(remote_config) => {
                info!(gateways = ?remote_config.gateways, "Remote source: HTTP gateways");
                Some(Arc::new(RemoteSource::new(remote_config)?))
            }
            None => None,
        };

        let access = ContentAccess::new(direct, remote)?;

        Ok(Self { config, access })
    }

    async fn open_ledger(config: &AccessConfig) -> anyhow::Result<Arc<dyn PinLedger>> {
        match &config.ledger_path {
            Some(path) => {
                let ledger = JsonFilePinLedger::open(path).await?;
                info!(path = %path.display(), "Pin ledger: JSON file");
                Ok(Arc::new(ledger))
            }
            None => {
                warn!("Pin ledger is in memory; pin records will NOT persist");
                Ok(Arc::new(MemoryPinLedger::new()))
            }
        }
    }
}

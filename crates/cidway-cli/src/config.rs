//! CLI configuration loading
//!
//! Layers, lowest to highest: built-in defaults, an optional config file,
//! `CIDWAY_*` environment variables, then command-line flags.

use anyhow::Context;
use cidway_core::AccessConfig;
use config::{Config, Environment, File, Map};
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `CIDWAY_NODE_URL`
pub const ENV_PREFIX: &str = "CIDWAY";

/// Values given on the command line
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub node_url: Option<String>,
    pub gateways: Vec<String>,
    pub ledger_path: Option<PathBuf>,
    pub image_gateway: Option<String>,
}

impl Overrides {
    /// Apply every value that was given
    pub fn apply(self, config: &mut AccessConfig) {
        if let Some(node_url) = self.node_url {
            config.node_url = Some(node_url);
        }
        if !self.gateways.is_empty() {
            config.gateways_urls = self.gateways;
        }
        if let Some(path) = self.ledger_path {
            config.ledger_path = Some(path);
        }
        if let Some(gateway) = self.image_gateway {
            config.image_gateway = gateway;
        }
    }
}

/// Load file and environment layers
pub fn load(file: Option<&Path>) -> anyhow::Result<AccessConfig> {
    load_with_env(file, None)
}

fn load_with_env(
    file: Option<&Path>,
    env: Option<Map<String, String>>,
) -> anyhow::Result<AccessConfig> {
    let mut builder = Config::builder();

    if let Some(path) = file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("gateways_urls")
            .source(env),
    );

    let settings = builder.build().context("failed to read configuration")?;
    let config: AccessConfig = settings
        .try_deserialize()
        .context("invalid configuration")?;

    Ok(config)
}

/// Full resolution: file, environment, then flags. The result is validated.
pub fn resolve(file: Option<&Path>, overrides: Overrides) -> anyhow::Result<AccessConfig> {
    let mut config = load(file)?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

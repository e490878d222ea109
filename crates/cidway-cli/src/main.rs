//! cidway - IPFS content access with owner-gated pinning

use clap::Parser;
use cidway_cli::{execute, execute_offline, resolve, AppState, Command, Output, Overrides};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "cidway")]
#[command(about = "Resolve, pin and unpin IPFS content through a node and public gateways")]
#[command(version)]
struct Args {
    /// Config file (TOML, JSON or YAML)
    #[arg(short, long, env = "CIDWAY_CONFIG")]
    config: Option<PathBuf>,

    /// IPFS API URL
    #[arg(long, env = "IPFS_API_URL")]
    node_url: Option<String>,

    /// Gateway base URL; repeat or separate with commas
    #[arg(long = "gateway", env = "IPFS_GATEWAYS", value_delimiter = ',')]
    gateways: Vec<String>,

    /// Pin ledger file; records are kept in memory when absent
    #[arg(long, env = "CIDWAY_LEDGER")]
    ledger: Option<PathBuf>,

    /// Gateway used for resized-image URLs
    #[arg(long, env = "CIDWAY_IMAGE_GATEWAY")]
    image_gateway: Option<String>,

    /// Enable debug logging
    #[arg(short, long, env = "CIDWAY_DEBUG")]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long, env = "CIDWAY_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

fn init_logging(debug: bool, json: bool) {
    let log_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("cidway={}", log_level).into());

    // Logs go to stderr; stdout carries command output.
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn print(output: Output) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    match output {
        Output::Bytes(bytes) => stdout.write_all(&bytes)?,
        Output::Json(value) => writeln!(stdout, "{}", serde_json::to_string_pretty(&value)?)?,
        Output::Text(text) => writeln!(stdout, "{}", text)?,
    }
    stdout.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(args.debug, args.json_logs);

    if let Some(output) = execute_offline(&args.command) {
        return print(output);
    }

    let overrides = Overrides {
        node_url: args.node_url,
        gateways: args.gateways,
        ledger_path: args.ledger,
        image_gateway: args.image_gateway,
    };
    let config = resolve(args.config.as_deref(), overrides)?;
    let state = AppState::new(config).await?;

    let output = execute(args.command, &state).await?;
    print(output)
}

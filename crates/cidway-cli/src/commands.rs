//! Subcommands and their execution

use crate::state::AppState;
use anyhow::Context;
use bytes::Bytes;
use cidway_core::{extract_cid, ContentId, OwnerId};
use cidway_store::{detect, ByteStream, StoreError};
use clap::Subcommand;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Chunk size for streamed uploads
const UPLOAD_CHUNK_SIZE: usize = 256 * 1024;

/// Bytes read to sniff an upload's type
const SNIFF_LEN: usize = 8 * 1024;

const DEFAULT_MIMETYPE: &str = "application/octet-stream";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read content, node first
    Get {
        cid: String,
        /// Print as JSON when the content parses as JSON
        #[arg(long)]
        parsed: bool,
    },
    /// Read a file by CID or gateway URL, gateways first
    File {
        url: String,
        /// Write the content here and print a summary
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Read content from whichever source answers first
    Fastest { cid: String },
    /// Pin a local file for an owner
    Pin {
        path: PathBuf,
        #[arg(long, env = "CIDWAY_OWNER")]
        owner: String,
    },
    /// Stream a local file into the node and pin it with its metadata
    Upload {
        path: PathBuf,
        #[arg(long, env = "CIDWAY_OWNER")]
        owner: String,
        /// MIME type; sniffed from the content when absent
        #[arg(long)]
        mimetype: Option<String>,
    },
    /// Remove an owner's pin
    Unpin {
        cid: String,
        #[arg(long, env = "CIDWAY_OWNER")]
        owner: String,
    },
    /// List an owner's pins, newest first
    Pins {
        #[arg(long, env = "CIDWAY_OWNER")]
        owner: String,
    },
    /// Node identity and peers
    Status,
    /// Fetch a metadata document by base64-encoded URL and rewrite its image
    Metadata { encoded_url: String },
    /// Resized-image URL for a CID
    ImageUrl { cid: String },
    /// Extract the CID from a URL
    Extract { url: String },
}

/// What a command prints
#[derive(Debug)]
pub enum Output {
    Bytes(Bytes),
    Json(Value),
    Text(String),
}

fn extracted(url: &str) -> Output {
    Output::Json(json!({
        "cid": extract_cid(url).map(ContentId::into_string),
    }))
}

/// Commands that work without any source
pub fn execute_offline(command: &Command) -> Option<Output> {
    match command {
        Command::Extract { url } => Some(extracted(url)),
        _ => None,
    }
}

/// Run `command` against `state`
pub async fn execute(command: Command, state: &AppState) -> anyhow::Result<Output> {
    let access = &state.access;

    let output = match command {
        Command::Get { cid, parsed: false } => Output::Bytes(access.get(&ContentId::new(cid)).await?),
        Command::Get { cid, parsed: true } => {
            Output::Json(serde_json::to_value(access.get_parsed(&ContentId::new(cid)).await?)?)
        }
        Command::File { url, output: None } => Output::Bytes(access.get_file(&url).await?.bytes),
        Command::File {
            url,
            output: Some(path),
        } => {
            let typed = access.get_file(&url).await?;
            tokio::fs::write(&path, &typed.bytes)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            Output::Json(json!({
                "path": path,
                "size": typed.bytes.len(),
                "detected": typed.detected,
            }))
        }
        Command::Fastest { cid } => Output::Bytes(access.get_fastest(&ContentId::new(cid)).await?),
        Command::Pin { path, owner } => {
            let content = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let cid = access
                .pin(Bytes::from(content), &OwnerId::new(owner), false)
                .await?;
            Output::Json(json!({ "cid": cid }))
        }
        Command::Upload {
            path,
            owner,
            mimetype,
        } => {
            let cid = upload(state, &path, &OwnerId::new(owner), mimetype).await?;
            Output::Json(json!({ "cid": cid }))
        }
        Command::Unpin { cid, owner } => {
            let cid = ContentId::new(cid);
            let unpinned = access.unpin(&cid, &OwnerId::new(owner)).await?;
            Output::Json(json!({ "cid": cid, "unpinned": unpinned }))
        }
        Command::Pins { owner } => {
            Output::Json(serde_json::to_value(access.list_pins(&OwnerId::new(owner)).await?)?)
        }
        Command::Status => Output::Json(serde_json::to_value(access.status().await?)?),
        Command::Metadata { encoded_url } => Output::Json(access.get_metadata(&encoded_url).await?),
        Command::ImageUrl { cid } => Output::Text(access.get_image_url(&ContentId::new(cid))),
        Command::Extract { url } => extracted(&url),
    };

    Ok(output)
}

async fn upload(
    state: &AppState,
    path: &Path,
    owner: &OwnerId,
    mimetype: Option<String>,
) -> anyhow::Result<ContentId> {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))?;

    let mut file = File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let size = file.metadata().await?.len();

    let mimetype = match mimetype {
        Some(mimetype) => mimetype,
        None => {
            let mut head = vec![0u8; SNIFF_LEN];
            let read = file.read(&mut head).await?;
            detect(&head[..read])
                .map(|detected| detected.mime)
                .unwrap_or_else(|| DEFAULT_MIMETYPE.to_string())
        }
    };

    // Reopen so the stream starts from the first byte.
    let file = File::open(path).await?;
    let cid = state
        .access
        .upload_and_pin(file_stream(file), filename, mimetype, size, owner)
        .await?;

    Ok(cid)
}

/// Read `file` as a stream of chunks
pub fn file_stream(file: File) -> ByteStream {
    stream::try_unfold(file, |mut file| async move {
        let mut buffer = vec![0u8; UPLOAD_CHUNK_SIZE];
        let read = file.read(&mut buffer).await.map_err(StoreError::from)?;
        if read == 0 {
            return Ok::<_, StoreError>(None);
        }
        buffer.truncate(read);
        Ok(Some((Bytes::from(buffer), file)))
    })
    .boxed()
}

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use sockbridge_core::transfer::upload_file;
use sockbridge_core::{
    CallbackRegistry, ClientConfig, Collaborators, Connection, Dispatcher, ReplyError, Severity,
    UploadOptions, WaitOptions,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod terminal;

use terminal::TerminalUi;

/// How long to wait for the socket to open before giving up
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Grace period for the close handshake after the last frame is queued
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "sockbridge", version, about = "Talk to a sockbridge backend over WebSocket")]
struct Cli {
    /// Backend URL, overrides the config file and SOCKBRIDGE_URL
    #[arg(long, global = true)]
    url: Option<String>,

    /// Accept confirmation pop-ups without asking
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one command envelope
    Send {
        /// Envelope type, e.g. list_files
        kind: String,
        /// JSON payload (a bare word is sent as a string)
        #[arg(long)]
        data: Option<String>,
        /// Wait for the next envelope of this type and print it
        #[arg(long)]
        wait: Option<String>,
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Print only the reply's content instead of the whole envelope
        #[arg(long)]
        content: bool,
    },
    /// Upload a file in chunks
    Upload {
        path: PathBuf,
        /// Destination folder, segments separated by '/'
        #[arg(long)]
        folder: Option<String>,
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Loading-screen text
        #[arg(long)]
        label: Option<String>,
    },
    /// Print inbound envelopes until the socket closes or Ctrl-C
    Listen {
        /// Only print envelopes of these types
        #[arg(long = "type")]
        kinds: Vec<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // 0. Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // 1. Resolve configuration
    let mut config = ClientConfig::load();
    if let Some(url) = cli.url {
        config.server_url = url;
    }
    let url = config.server_url().context("Invalid server URL")?;

    // 2. Wire the terminal into the dispatcher
    let ui = Arc::new(TerminalUi::new(cli.yes));
    let mut callbacks = CallbackRegistry::new();
    callbacks.register("quit", || tracing::info!("Backend asked the client to quit"));
    let dispatcher = Dispatcher::new(Collaborators::from_ui(ui), callbacks);

    // 3. Connect
    let conn = Connection::connect(url.as_str(), dispatcher);
    tokio::select! {
        _ = conn.ready() => {}
        _ = conn.closed() => bail!("Could not connect to {}", url),
        _ = tokio::time::sleep(CONNECT_TIMEOUT) => bail!("Timed out connecting to {}", url),
    }

    // 4. Run the command
    let result = match cli.command {
        Command::Send {
            kind,
            data,
            wait,
            timeout_ms,
            content,
        } => {
            let data = parse_data(data.as_deref());
            let mut opts =
                WaitOptions::default().with_timeout_ms(timeout_ms.or(config.reply_timeout_ms));
            if content {
                opts = opts.unwrap_content();
            }
            send(&conn, &kind, &data, wait.as_deref(), opts).await
        }
        Command::Upload {
            path,
            folder,
            chunk_size,
            label,
        } => {
            let options = UploadOptions {
                folder: split_folder(folder.as_deref()),
                chunk_size: chunk_size.unwrap_or(config.chunk_size),
                label,
                show_progress: config.show_progress,
                cancel: None,
            };
            tokio::select! {
                res = upload_file(&conn, &path, &options) => res
                    .map(|summary| {
                        tracing::info!(
                            "Uploaded {} ({} bytes, {} chunks, id {})",
                            summary.filename,
                            summary.bytes_sent,
                            summary.total_chunks,
                            summary.upload_id
                        );
                    })
                    .with_context(|| format!("Upload of {} failed", path.display())),
                _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("Upload interrupted")),
            }
        }
        Command::Listen { kinds } => listen(&conn, &kinds).await,
    };

    // 5. Close cleanly so queued frames are flushed
    conn.close();
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, conn.closed()).await;

    result
}

async fn send(
    conn: &Connection,
    kind: &str,
    data: &Value,
    wait: Option<&str>,
    opts: WaitOptions,
) -> anyhow::Result<()> {
    let Some(reply_kind) = wait else {
        if !conn.send_message(kind, data) {
            bail!("Connection is {}, '{}' not sent", conn.state(), kind);
        }
        return Ok(());
    };

    match conn.request(kind, data, reply_kind, opts).await {
        Ok(reply) => {
            println!("{}", serde_json::to_string_pretty(&reply)?);
            Ok(())
        }
        Err(e @ ReplyError::Timeout { .. }) => {
            conn.ui()
                .notifier
                .notify(Severity::Warning, &e.to_string(), None);
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn listen(conn: &Connection, kinds: &[String]) -> anyhow::Result<()> {
    let mut inbound = conn.subscribe();
    loop {
        tokio::select! {
            msg = inbound.recv() => match msg {
                Ok(envelope) => {
                    if kinds.is_empty() || kinds.contains(&envelope.kind) {
                        println!("{}", envelope.to_text()?);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Skipped {} envelopes", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
            },
            _ = conn.closed() => return Ok(()),
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

/// JSON if it parses, otherwise the raw text as a string. No data sends `""`.
fn parse_data(raw: Option<&str>) -> Value {
    match raw {
        None => Value::String(String::new()),
        Some(text) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        }
    }
}

fn split_folder(raw: Option<&str>) -> Vec<String> {
    raw.map(|f| {
        f.split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

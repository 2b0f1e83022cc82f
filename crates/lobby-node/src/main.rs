//! Lobby Node - presence-aware chat lobby server.

use anyhow::Context;
use clap::Parser;
use lobby_node::config::NodeConfig;
use lobby_node::observability::{init_logging, LogFormat};
use lobby_realtime::Lobby;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Lobby Node - real-time chat lobby with presence
#[derive(Parser, Debug)]
#[command(name = "lobby-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API listen address (overrides the configuration file)
    #[arg(long)]
    api_addr: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = NodeConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(addr) = args.api_addr {
        config.api_addr = addr;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    if let Some(format) = args.log_format {
        config.log_format = format;
    }

    init_logging(&config.log_level, LogFormat::parse(&config.log_format));

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting lobby node");
    tracing::info!(
        api_addr = %config.api_addr,
        probe_interval_secs = config.probe_interval_secs,
        reply_deadline_secs = config.reply_deadline_secs,
        max_connections = config.max_connections,
        "Node configuration"
    );

    let lobby = Arc::new(Lobby::new(config.lobby_config()));
    let listener = tokio::net::TcpListener::bind(config.api_addr)
        .await
        .with_context(|| format!("binding {}", config.api_addr))?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        signal.cancel();
    });

    tracing::info!("Lobby is ready. Press Ctrl+C to stop.");
    lobby_node::serve(listener, lobby, shutdown).await?;

    tracing::info!("Lobby node stopped");
    Ok(())
}

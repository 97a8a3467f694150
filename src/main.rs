#![forbid(unsafe_code)]

//! `agent-bridge` — bridge server binary.
//!
//! Bootstraps configuration, starts the stdio transport, the local-socket
//! listener, and the session idle sweep.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use agent_bridge::bridge::agent::EchoAgent;
use agent_bridge::bridge::Bridge;
use agent_bridge::config::BridgeConfig;
use agent_bridge::session::registry::spawn_sweep_task;
use agent_bridge::transport::socket::spawn_socket_listener;
use agent_bridge::transport::stream::run_stdio;
use agent_bridge::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-bridge", about = "IDE/agent session bridge", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the local socket name from the config.
    #[arg(long)]
    socket_name: Option<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-bridge bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => BridgeConfig::load_from_path(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(name) = args.socket_name {
        config.socket_name = name;
    }
    let config = Arc::new(config);
    info!(socket = %config.socket_name, "configuration loaded");

    // ── Build the bridge ────────────────────────────────
    let bridge = Arc::new(Bridge::new(Arc::clone(&config), Arc::new(EchoAgent)));
    let ct = CancellationToken::new();

    // ── Session idle sweep ──────────────────────────────
    let sweep_handle = spawn_sweep_task(bridge.registry(), config.sweep, ct.clone());
    info!("session sweep started");

    // ── Socket transport ────────────────────────────────
    let socket_handle = spawn_socket_listener(Arc::clone(&bridge), &config.socket_name, ct.clone())?;

    // ── Stdio transport (foreground) ────────────────────
    // The process lives as long as the IDE keeps stdin open; EOF there is
    // the shutdown signal for everything else.
    let stdio_result = run_stdio(Arc::clone(&bridge), ct.clone()).await;

    info!("stdio stream closed, shutting down");
    ct.cancel();
    let _ = socket_handle.await;
    let _ = sweep_handle.await;

    stdio_result
}

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr; stdout carries the wire protocol.
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let init_result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    init_result.map_err(|err| AppError::Config(format!("tracing init failed: {err}")))
}

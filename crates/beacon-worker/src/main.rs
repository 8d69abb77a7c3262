//! # beacon-worker
//!
//! One Beacon worker process: loads settings, connects the broker, and serves
//! WebSocket clients until a termination signal drains it.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use beacon_core::ProcessId;
use beacon_server::shutdown::{HardExit, spawn_signal_listener};
use beacon_server::{BeaconServer, ServerConfig, ServerContext};
use beacon_settings::BeaconSettings;
use clap::Parser;
use tokio::task::JoinHandle;

/// Beacon WebSocket broadcast worker.
#[derive(Parser, Debug)]
#[command(name = "beacon-worker", about = "Beacon WebSocket broadcast worker")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// JSON settings file (takes precedence over `BEACON_CONFIG`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Broker URL, `redis://…` or `memory://` (overrides `REDIS_URL`).
    #[arg(long)]
    redis_url: Option<String>,
}

/// Settings with CLI flags applied last.
fn resolve_settings(cli: &Cli) -> Result<BeaconSettings> {
    let mut settings = match &cli.config {
        Some(path) => beacon_settings::loader::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => beacon_settings::loader::load_settings().context("Failed to load settings")?,
    };
    if let Some(host) = &cli.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(url) = &cli.redis_url {
        settings.broker.url.clone_from(url);
    }
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    beacon_core::logging::init_subscriber(&settings.logging.level, settings.logging.format);
    let metrics = beacon_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let broker = beacon_bus::from_url(&settings.broker.url, settings.broker.op_timeout())
        .context("Failed to open broker")?;
    let process = ProcessId::current();
    tracing::info!(
        pid = %process,
        broker = broker.name(),
        version = beacon_core::constants::VERSION,
        "starting beacon worker"
    );

    let config = ServerConfig::from(&settings);
    let ctx = ServerContext::new(process, broker, &config);
    let server = BeaconServer::new(config, ctx, metrics);

    server.start_background().await;
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("Beacon worker {process} listening on http://{addr}");

    let _signals = spawn_signal_listener(Arc::clone(server.context()), Arc::new(HardExit));

    // the drain sequence exits the process; this only returns if serving fails
    wait_for_server(handle).await
}

/// Await the serve task, turning a failure or panic into an error exit.
async fn wait_for_server(handle: JoinHandle<std::io::Result<()>>) -> Result<()> {
    handle
        .await
        .context("Server task panicked")?
        .context("Server stopped serving")
}

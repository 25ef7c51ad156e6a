//! Serve command - run the scheduler and relay

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use cued_config::Config;
use cued_scheduler::{CueRelay, CueRelayConfig, Dispatcher, DispatcherConfig};

/// Serve command arguments
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to configuration file (defaults to cued.toml if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = std::env::consts::OS,
        "cued starting"
    );

    let config = load_config(args.config)?;

    if let Err(e) = run_server(config).await {
        error!(error = %e, "server error");
        return Err(e);
    }

    info!("cued shutdown complete");
    Ok(())
}

/// Load configuration: explicit path must exist, otherwise try defaults
fn load_config(path: Option<PathBuf>) -> Result<Config> {
    if let Some(path) = path {
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        return Config::from_file(&path).context("failed to load configuration");
    }

    let default_paths = [PathBuf::from("cued.toml"), PathBuf::from("configs/cued.toml")];
    for path in &default_paths {
        if path.exists() {
            info!(config = %path.display(), "using config file");
            return Config::from_file(path).context("failed to load configuration");
        }
    }

    info!("no config file found, using defaults");
    Ok(Config::default())
}

/// Main server run loop
async fn run_server(config: Config) -> Result<()> {
    // Coordinated shutdown for both control loops
    let cancel = CancellationToken::new();

    let relay_config = CueRelayConfig {
        cue_port: config.server.cue_port,
        observer_host: config.server.observer_host.clone(),
        observer_port: config.server.observer_port,
        internal: config.server.internal,
        enabled: config.server.enabled,
        heartbeat: Duration::from_secs(config.server.heartbeat_secs),
        ..Default::default()
    };
    let (relay, relay_handle) = CueRelay::bind(relay_config, cancel.clone())
        .await
        .context("failed to start cue relay")?;

    let dispatcher_config = DispatcherConfig {
        command_port: config.server.command_port,
        ..Default::default()
    };
    let dispatcher = Dispatcher::bind(dispatcher_config, relay_handle, cancel.clone())
        .await
        .context("failed to start command dispatcher")?;

    info!(
        command_port = config.server.command_port,
        cue_port = config.server.cue_port,
        observer = %config.server.observer_addr(),
        "cued listening"
    );

    let relay_task = tokio::spawn(relay.run());
    let dispatcher_task = tokio::spawn(dispatcher.run());

    // Wait for ctrl-c, then cancel both loops and drain
    signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    cancel.cancel();

    let _ = relay_task.await;
    let _ = dispatcher_task.await;

    Ok(())
}

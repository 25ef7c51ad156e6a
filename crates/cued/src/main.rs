//! cued - UDP command scheduler and cue relay daemon
//!
//! # Usage
//!
//! ```bash
//! # Run the server (default)
//! cued
//! cued --config cued.toml
//!
//! # Explicit subcommand, debug logging
//! cued serve --log-level debug
//! ```

mod serve;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cued_config::{Config, LogFormat};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// cued - UDP command scheduler and cue relay daemon
#[derive(Parser, Debug)]
#[command(name = "cued")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the server
    Serve(serve::ServeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Serve(mut args)) => {
            // CLI global --config overrides subcommand config if both specified
            if args.config.is_none() && cli.config.is_some() {
                args.config = cli.config;
            }
            init_logging_for(cli.log_level.as_deref(), args.config.as_deref())?;
            serve::run(args).await
        }
        // No subcommand = run server (default behavior)
        None => {
            init_logging_for(cli.log_level.as_deref(), cli.config.as_deref())?;
            let args = serve::ServeArgs { config: cli.config };
            serve::run(args).await
        }
    }
}

/// Resolve level and format from CLI flag and config file, then initialize
fn init_logging_for(
    cli_level: Option<&str>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let config = config_path
        .filter(|p| p.exists())
        .and_then(|p| Config::from_file(p).ok());

    // CLI flag > config file > default "info"
    let level = cli_level
        .map(str::to_string)
        .or_else(|| config.as_ref().map(|c| c.log.level.as_str().to_string()))
        .unwrap_or_else(|| "info".to_string());

    let format = config.map(|c| c.log.format).unwrap_or_default();

    init_logging(&level, format)
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    match format {
        LogFormat::Console => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_thread_ids(false))
                .with(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .init();
        }
    }

    Ok(())
}

//! Abyss curse node binary.
//!
//! Runs the curse engine as a sidecar to a game host. The host streams
//! lifecycle and position messages as JSON lines on stdin; curse events and
//! query replies come back as JSON lines on stdout. Logs go to stderr.

mod bridge;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};

use abyss_node_lib::{Node, NodeConfig};

use crate::bridge::{forward_events, write_lines, Bridge};

/// Abyss curse node: rising out of the abyss has a price.
#[derive(Parser, Debug)]
#[command(
    name = "abyss-node",
    version,
    about = "Abyss curse engine speaking JSON lines on stdin/stdout"
)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for curse storage
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json"); overrides the config file
    #[arg(long)]
    log_format: Option<String>,

    /// Keep curse state in memory only
    #[arg(long)]
    ephemeral: bool,
}

impl Args {
    /// Load the configuration file and environment, then apply CLI overrides.
    fn into_config(self) -> anyhow::Result<(NodeConfig, Option<PathBuf>)> {
        let mut config = NodeConfig::load(self.config.as_deref())
            .with_context(|| format!("failed to load configuration from {:?}", self.config))?;
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        config.ephemeral |= self.ephemeral;
        Ok((config, self.config))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, config_path) = Args::parse().into_config()?;

    init_logging(&config.log_level, &config.log_format);

    info!("Abyss curse node v{}", env!("CARGO_PKG_VERSION"));
    info!("data_dir: {:?}", config.data_dir);
    info!("ephemeral: {}", config.ephemeral);
    info!("mode: {} radius: {}", config.region.mode, config.region.radius);

    let node = Node::open(config).context("failed to start node")?;

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_lines(out_rx, tokio::io::stdout()));
    let forwarder = tokio::spawn(forward_events(node.subscribe(), out_tx.clone()));
    let bridge = Bridge::new(node.clone(), config_path, out_tx);

    info!("Abyss node running (Ctrl+C to stop)");

    let shutdown_signal = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down..."),
            Err(e) => {
                error!("failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = node.run() => {
            info!("autosave loop exited");
        }
        result = bridge.serve(tokio::io::stdin()) => {
            match result {
                Ok(()) => info!("host closed input"),
                Err(e) => error!("host input failed: {:#}", e),
            }
        }
        _ = shutdown_signal => {
            info!("shutdown signal received");
        }
    }

    let saved = node.shutdown().await;
    info!("saved {} entities", saved);

    // Writer exits once every output sender is gone.
    forwarder.abort();
    drop(bridge);
    match writer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("failed to write output: {}", e),
        Err(e) => error!("output task failed: {}", e),
    }

    info!("Abyss node shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output. Any other value
/// defaults to human-readable text. Both write to stderr.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

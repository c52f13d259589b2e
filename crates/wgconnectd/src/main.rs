//! wgconnectd - wgconnect tunnel reconciliation daemon
//!
//! Discovers the `WireGuard` tunnels configured on this host, keeps the
//! tunnel inventory in step with them, and prepares the info requests sent
//! to each tunnel's peer.

mod config;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wgc_reconcile::{JsonFileInventory, LogNotifier, PassReport, Reconciler};
use wgc_wireguard::{parse_all_dump, parse_dump, SystemSource};

use crate::config::{DaemonConfig, DEFAULT_CONFIG_PATH};

type Engine = Reconciler<SystemSource, JsonFileInventory, LogNotifier>;

#[derive(Parser)]
#[command(name = "wgconnectd")]
#[command(about = "wgconnect tunnel reconciliation daemon")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single reconciliation pass and print the result
    Reconcile {
        /// Path to config file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Reconcile periodically until interrupted
    Run {
        /// Path to config file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Parse `wg show dump` output and print it as JSON
    ParseDump {
        /// Read from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Interface name; without it the input is `wg show all dump` output
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Generate a default config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("wgconnectd=info,wgc_reconcile=info"))?;
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    match cli.command {
        Commands::Reconcile { config } => reconcile_once(&config).await?,
        Commands::Run { config } => run(&config).await?,
        Commands::ParseDump { file, name } => parse_dump_cmd(file.as_deref(), name.as_deref())?,
        Commands::InitConfig { output } => init_config(&output)?,
    }

    Ok(())
}

fn build_engine(config: &DaemonConfig) -> anyhow::Result<Engine> {
    let inventory = JsonFileInventory::open(&config.inventory_path)?;
    info!(
        inventory = %config.inventory_path.display(),
        v4_prefix = %config.reconcile.v4_interface_prefix,
        v6_prefix = %config.reconcile.v6_interface_prefix,
        "loaded config"
    );
    Ok(Reconciler::new(
        config.reconcile.clone(),
        config.source(),
        inventory,
        LogNotifier,
    ))
}

fn log_requests(report: &PassReport) {
    for request in report.build_requests() {
        debug!(
            to = %request.remote_addr(),
            xid = request.transaction_id(),
            bytes = request.encode().len(),
            "info request ready"
        );
    }
}

async fn reconcile_once(config_path: &Path) -> anyhow::Result<()> {
    let config = DaemonConfig::from_file(config_path)?;
    let engine = build_engine(&config)?;

    let report = engine.reconcile().await?;
    log_requests(&report);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run(config_path: &Path) -> anyhow::Result<()> {
    info!(config = %config_path.display(), "starting wgconnectd");
    let config = DaemonConfig::from_file(config_path)?;
    let engine = build_engine(&config)?;

    let mut ticker = tokio::time::interval(Duration::from_secs(config.interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match engine.reconcile().await {
                    Ok(report) => {
                        if !report.failures.is_empty() {
                            warn!(failed = report.failures.len(), "some tunnels were not persisted");
                        }
                        log_requests(&report);
                        info!(%report, "pass finished");
                    }
                    Err(e) if e.is_fatal_for_pass() => {
                        error!(error = %e, "pass aborted, retrying next interval");
                    }
                    Err(e) => error!(error = %e, "pass failed"),
                }
            }
            _ = &mut shutdown => {
                info!("shutting down");
                return Ok(());
            }
        }
    }
}

fn parse_dump_cmd(file: Option<&Path>, name: Option<&str>) -> anyhow::Result<()> {
    let text = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let json = match name {
        Some(name) => serde_json::to_string_pretty(&parse_dump(name, &text)?)?,
        None => serde_json::to_string_pretty(&parse_all_dump(&text)?)?,
    };
    println!("{json}");
    Ok(())
}

fn init_config(output: &Path) -> anyhow::Result<()> {
    DaemonConfig::default().save(output)?;

    println!("Config written to {}", output.display());
    println!();
    println!("Edit the interface prefixes if needed, then run:");
    println!("  wgconnectd run --config {}", output.display());

    Ok(())
}

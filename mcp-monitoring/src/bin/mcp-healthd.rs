//! Health monitoring daemon for MCP server fleets
//!
//! Runs monitoring cycles on the configured interval until Ctrl-C, or a
//! single cycle with `--once`, printing a JSON report.

use anyhow::{Context, Result};
use clap::Parser;
use mcp_health_logging::{LogConfig, init_logging};
use mcp_health_monitor::{CycleResults, FleetConfig, HealthMonitor, MetricsSnapshot};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mcp-healthd")]
#[command(about = "Dual-protocol health monitor for MCP servers")]
#[command(version)]
struct Cli {
    /// Fleet configuration file (TOML, or YAML by extension)
    #[arg(short, long, env = "MCP_HEALTH_CONFIG")]
    config: PathBuf,

    /// Run a single cycle and print a JSON report
    #[arg(long)]
    once: bool,

    /// Restrict a `--once` run to these servers (repeatable)
    #[arg(short, long = "server", requires = "once")]
    servers: Vec<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Print Prometheus metrics after a `--once` run
    #[arg(long, requires = "once")]
    prometheus: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    servers: BTreeMap<&'a str, &'a mcp_health_monitor::CombinedHealthRecord>,
    metrics: MetricsSnapshot,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let fleet = FleetConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    init_logging(&LogConfig {
        default_filter: fleet.logging.filter.clone(),
        json: cli.json_logs || fleet.logging.json,
        with_target: false,
    })
    .context("initializing logging")?;

    let monitor = HealthMonitor::from_fleet(&fleet)?;
    info!(
        servers = fleet.servers.len(),
        config = %cli.config.display(),
        "Configuration loaded"
    );

    if cli.once {
        let results = if cli.servers.is_empty() {
            monitor.run_configured_cycle().await
        } else {
            monitor.trigger_manual_check(&cli.servers, None).await?
        };
        print_report(&monitor, &results)?;
        if cli.prometheus {
            print!("{}", monitor.metrics().render_prometheus()?);
        }
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown requested"),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
            }
            shutdown.cancel();
        }
    });

    monitor.run(shutdown).await;
    Ok(())
}

fn print_report(monitor: &HealthMonitor, results: &CycleResults) -> Result<()> {
    let report = Report {
        servers: results
            .iter()
            .map(|(name, record)| (name.as_str(), record.as_ref()))
            .collect(),
        metrics: monitor.metrics().snapshot(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

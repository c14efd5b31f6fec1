//! slicerouter-sidecar - operator entry point for the slice router core
//!
//! Bootstraps the configured dataplane and runs one operation against it.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use slicerouter_common::config::DEFAULT_CONFIG_PATH;
use slicerouter_common::SidecarConfig;
use slicerouter_sidecar::bootstrap;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Slice router dataplane sidecar
#[derive(Parser, Debug)]
#[command(name = "slicerouter-sidecar")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install the route to a remote subnet
    InjectRoute {
        /// Remote subnet in CIDR notation
        #[arg(long)]
        subnet: String,

        /// Next hop address
        #[arg(long)]
        next_hop: String,
    },

    /// Print the pod-facing tunnel connections as JSON
    ListConnections,

    /// Run a reconciliation pass now
    Reconcile,

    /// Print the resolved dataplane mode
    ShowMode,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "slicerouter-sidecar failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = SidecarConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    if let Command::ShowMode = args.command {
        println!("{}", config.dataplane_mode());
        return Ok(());
    }

    let router = bootstrap(&config).await.context("bootstrap")?;
    info!(backend = %router.mode(), "Slice router ready");

    match args.command {
        Command::InjectRoute { subnet, next_hop } => {
            router
                .inject_route(&subnet, &next_hop)
                .await
                .context("inject route")?;
            info!(subnet = %subnet, next_hop = %next_hop, "Route in place");
        }
        Command::ListConnections => {
            let connections = router
                .list_client_connections()
                .await
                .context("list connections")?;
            println!("{}", serde_json::to_string_pretty(&connections)?);
        }
        Command::Reconcile => {
            let report = router.reconcile_now().await.context("reconcile")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::ShowMode => {}
    }

    Ok(())
}

//! devlink command line.
//!
//! Lists reachable devices and runs the standard open-and-probe job against
//! one of them. Transports come from the `DEVLINK_*` environment; `--mock`
//! swaps them for an in-process mock with two demo devices.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use devlink_core::LinkConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "devlink")]
#[command(about = "Discover hardware wallets and run device jobs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use the in-process mock transport instead of real hardware
    #[arg(long, global = true)]
    mock: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the devices visible within a discovery window
    List {
        /// Discovery window in seconds
        #[arg(short, long, default_value = "3")]
        seconds: u64,

        /// Print the device list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Open a device and probe it
    Run {
        /// Device id as printed by `list`
        device_id: String,

        /// Wait for a line on stdin before finishing the job
        #[arg(long)]
        confirm: bool,

        /// Give up on the open step after this many seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = LinkConfig::from_env().context("invalid DEVLINK_* configuration")?;
    devlink_transport::debug::set_debug_mode(config.debug);
    debug!(?config, mock = cli.mock, "Configuration loaded");

    let registry = commands::build_registry(&config, cli.mock)?;

    match cli.command {
        Commands::List { seconds, json } => {
            commands::list::run(&registry, seconds, json).await?;
        }
        Commands::Run {
            device_id,
            confirm,
            timeout,
        } => {
            commands::run::run(registry, &config, &device_id, confirm, timeout).await?;
        }
    }

    Ok(())
}

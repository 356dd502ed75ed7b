//! ERC-20 holder snapshot CLI.
//!
//! Resolves the block at a given time, replays every `Transfer` log of a
//! token from its origin block up to there, and writes the resulting
//! balances as JSON and CSV.
//!
//! # Usage
//!
//! ```bash
//! # Snapshot using config.toml in the working directory
//! holder-snapshot run
//!
//! # Override the time and network from the command line
//! holder-snapshot run --network polygon --at 2024-12-01T00:00:00Z
//!
//! # Skip the price lookup and use a private RPC
//! holder-snapshot run --no-price --rpc https://my-rpc.example.com
//!
//! # Show supported networks
//! holder-snapshot networks
//! ```

use std::path::PathBuf;

use alloy::primitives::Address;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use holder_snapshot_cli::config::{self, Config, Overrides};
use holder_snapshot_cli::output::FileSink;
use holder_snapshot_cli::price::CoinGecko;
use holder_snapshot_cli::{chains, rpc};

/// Point-in-time ERC-20 holder snapshots.
#[derive(Debug, Parser)]
#[command(name = "holder-snapshot", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Take a snapshot and write `balances_<network>.{json,csv}`.
    Run(RunArgs),

    /// List supported networks.
    Networks,
}

/// Flags for `run`; each overrides the matching `[snapshot]` value.
#[derive(Debug, Args)]
struct RunArgs {
    /// Network key (see `networks`).
    #[arg(long)]
    network: Option<String>,

    /// ERC-20 contract address.
    #[arg(long)]
    token: Option<Address>,

    /// First block to replay, at or after the token deployment.
    #[arg(long)]
    origin_block: Option<u64>,

    /// Snapshot time as RFC 3339 or unix seconds.
    #[arg(long, value_parser = config::parse_timestamp)]
    at: Option<u64>,

    /// Blocks per `eth_getLogs` request.
    #[arg(long)]
    batch_size: Option<u64>,

    /// Use this RPC endpoint instead of the configured list.
    #[arg(long)]
    rpc: Option<String>,

    /// CoinGecko coin ID for the historical price.
    #[arg(long)]
    coingecko_id: Option<String>,

    /// CoinGecko demo API key.
    #[arg(long)]
    price_api_key: Option<String>,

    /// Skip the price lookup.
    #[arg(long)]
    no_price: bool,

    /// Directory for the output files.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl From<RunArgs> for Overrides {
    fn from(args: RunArgs) -> Self {
        Self {
            network: args.network,
            token: args.token,
            origin_block: args.origin_block,
            timestamp: args.at,
            batch_size: args.batch_size,
            rpc: args.rpc,
            coingecko_id: args.coingecko_id,
            price_api_key: args.price_api_key,
            no_price: args.no_price,
            output_dir: args.output_dir,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => cmd_run(&Config::load(&cli.config)?, args.into()).await,
        Command::Networks => {
            cmd_networks();
            Ok(())
        }
    }
}

/// Execute the `run` subcommand.
async fn cmd_run(config: &Config, overrides: Overrides) -> Result<()> {
    let plan = config.resolve(overrides)?;
    let oracle = CoinGecko::new(&plan.price)?;
    let sink = FileSink::new(&plan.output_dir);

    tracing::info!(
        network = plan.chain.name,
        token = %plan.snapshot.token,
        origin = plan.snapshot.origin_block,
        timestamp = plan.snapshot.target_timestamp,
        rpcs = plan.rpcs.len(),
        "starting snapshot"
    );

    let result = rpc::take_snapshot(&plan, &oracle, &sink).await?;

    match result.price_usd {
        Some(price) => tracing::info!(price_usd = price, "token price at snapshot time"),
        None => tracing::info!("historical price data is unavailable"),
    }
    tracing::info!(
        block = result.block_height,
        events = result.event_count,
        holders = result.balances.len(),
        json = %sink.json_path(&plan.snapshot.label).display(),
        csv = %sink.csv_path(&plan.snapshot.label).display(),
        "snapshot saved"
    );
    Ok(())
}

/// Execute the `networks` subcommand.
#[allow(clippy::print_stdout)]
fn cmd_networks() {
    println!(
        "{:<18} {:<26} {:<10} {:<6} RPC",
        "Key", "Name", "Chain ID", "Type"
    );
    println!("{}", "-".repeat(96));

    for chain in chains::ALL {
        let net_type = if chain.is_testnet { "test" } else { "main" };
        println!(
            "{:<18} {:<26} {:<10} {:<6} {}",
            chain.key, chain.name, chain.chain_id, net_type, chain.default_rpc,
        );
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CIVITAS NODE
//
// Bootstrap and demo-loop binary: wires the ledger, validator, PoH, multisig,
// governance, mining, and persistence crates together behind a small CLI.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

mod app;
mod config;
mod genesis;

use app::CivitasNode;
use clap::{Parser, Subcommand};
use config::NodeConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "civitas-node", version, about = "Civitas permissioned ledger node")]
struct Cli {
    /// Path to a TOML config file. Missing file falls back to defaults.
    #[arg(long, default_value = "civitas.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bootstrap a fresh data directory with a genesis block, if one doesn't already exist.
    Init,
    /// Run the continuous mining loop, producing a block every `mining_interval_secs`.
    Run,
    /// Run genesis (if needed) then mine exactly one block and exit.
    MineOnce,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = NodeConfig::load_from_file(&cli.config)?.apply_env_overrides();
    config.validate()?;

    match cli.command {
        Command::Init => run_init(config).await,
        Command::Run => run_serve(config).await,
        Command::MineOnce => run_mine_once(config).await,
    }
}

async fn run_init(config: NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let node = CivitasNode::build(config).await?;
    if node.needs_genesis() {
        genesis::bootstrap(&node).await?;
        tracing::info!("node initialized with a fresh genesis block");
    } else {
        tracing::info!(height = node.ledger.height(), "node already initialized, skipping genesis");
    }
    Ok(())
}

async fn run_mine_once(config: NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let node = CivitasNode::build(config).await?;
    if node.needs_genesis() {
        genesis::bootstrap(&node).await?;
    }
    let (validator_address, keypair) = app::ensure_demo_validator(&node).await?;
    let block = node.mining.mine_block(&validator_address, &keypair)?;
    node.persistence.flush_sync().await?;
    tracing::info!(height = block.index, hash = %block.hash, "mined block");
    Ok(())
}

async fn run_serve(config: NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let interval = Duration::from_secs(config.network.mining_interval_secs);
    let node = CivitasNode::build(config).await?;
    if node.needs_genesis() {
        genesis::bootstrap(&node).await?;
    }
    let (validator_address, keypair) = app::ensure_demo_validator(&node).await?;

    tracing::info!(interval_secs = interval.as_secs(), "entering mining loop");
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match node.mining.mine_block(&validator_address, &keypair) {
            Ok(block) => {
                tracing::info!(height = block.index, hash = %block.hash, txs = block.transactions.len(), "mined block");
            }
            Err(e) => {
                tracing::error!(error = %e, "mining round failed");
            }
        }
    }
}

//! Entry point for one fleet agent: boots its identity, wallet, and relay
//! connection, then runs until the supervisor stops it.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::info;

use zap_agent_sdk::agent::Agent;

#[derive(Parser)]
struct Args {
    /// Personality slot, 0-9 in the default fleet.
    #[arg(long)]
    id: u32,

    #[arg(long)]
    data_dir: PathBuf,

    #[arg(long)]
    relay_url: String,

    #[arg(long)]
    mint_url: String,

    #[arg(long, default_value_t = 60)]
    tick_interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    std::fs::create_dir_all(&args.data_dir)?;

    info!("agent {} booting (relay {})", args.id, args.relay_url);
    let agent = Agent::boot(
        args.id,
        args.data_dir,
        args.relay_url,
        args.mint_url,
        Duration::from_secs(args.tick_interval_secs),
    )
    .await?;

    info!("agent {} online", args.id);
    agent.run().await?;
    Ok(())
}

#![forbid(unsafe_code)]
#![allow(unreachable_pub)]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use merkle_airdrop::EngineConfig;

mod build_tree;
mod claim;
mod logging;
mod prove;

#[derive(Parser, Debug)]
#[command(name = "airdrop")]
#[command(about = "Merkle airdrop operator tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the Merkle tree and write the distribution file
    BuildTree(build_tree::Cli),
    /// Sign a bearer voucher for one distribution entry
    Claim(claim::Cli),
    /// Check distribution proofs against their root
    Prove(prove::Cli),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = EngineConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    logging::init(&config.logging)?;

    match cli.command {
        Commands::BuildTree(args) => build_tree::run(&args, &config)?,
        Commands::Claim(args) => claim::run(args)?,
        Commands::Prove(args) => prove::run(&args)?,
    }

    Ok(())
}

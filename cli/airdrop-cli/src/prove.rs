use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use merkle_airdrop::{parse_hash, DistributionFile};

#[derive(Args, Debug)]
pub struct Cli {
    /// Distribution file to check
    #[arg(short, long)]
    input: PathBuf,

    /// Only check the entry for this address
    #[arg(short, long)]
    address: Option<String>,

    /// Expected Merkle root (hex format); defaults to the root in the file
    #[arg(short, long)]
    root: Option<String>,
}

pub fn run(cli: &Cli) -> Result<()> {
    println!("Reading distribution from {:?}...", cli.input);
    let distribution =
        DistributionFile::load(&cli.input).context("Failed to read distribution file")?;
    if distribution.proofs.is_empty() {
        anyhow::bail!("Distribution file has no entries");
    }

    let expected_root = match &cli.root {
        Some(root) => parse_hash(root).context("Invalid Merkle root")?,
        None => distribution.proofs[0]
            .root()
            .context("Invalid Merkle root in distribution file")?,
    };
    for (index, entry) in distribution.proofs.iter().enumerate() {
        if entry.root().ok() != Some(expected_root) {
            anyhow::bail!("Entry {} does not commit to the expected root", index);
        }
    }

    if let Some(address) = &cli.address {
        let entry = distribution
            .find(address)
            .context("Address not found in distribution")?;
        if !entry.verify().context("Malformed distribution entry")? {
            anyhow::bail!("Proof for {} is INVALID", entry.address);
        }
        println!("Proof for {} ({}) is valid", entry.address, entry.amount);
        return Ok(());
    }

    println!("Verifying {} proofs...", distribution.proofs.len());
    let report = distribution.verify_all();
    if !report.all_valid() {
        anyhow::bail!(
            "{} of {} proofs are invalid (first at index {})",
            report.invalid.len(),
            distribution.proofs.len(),
            report.invalid[0]
        );
    }

    println!("All {} proofs are valid", report.valid);
    Ok(())
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use merkle_airdrop::{
    hex_encode, parse_amount, resolve_all, write_file_atomic, DistributionFile, EngineConfig,
    LeafSource, MerkleTree,
};
use serde::Deserialize;

#[derive(Args, Debug)]
pub struct Cli {
    /// Input JSON file: an array of {"address", "amount"} objects, or with
    /// --synthetic an array of amount strings
    #[arg(short, long)]
    input: PathBuf,

    /// Input holds bare amounts; generate anonymous keys for bearer airdrops
    #[arg(long)]
    synthetic: bool,

    /// Airdrop id recorded in the distribution file
    #[arg(short, long)]
    airdrop_id: u64,

    /// Output distribution file (proof per recipient)
    #[arg(short, long)]
    output: PathBuf,

    /// Output file for the Merkle root
    #[arg(short, long)]
    root_output: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ExplicitInput {
    address: String,
    amount: String,
}

/// Reads the input list. The caller's flag picks the variant; the file
/// shape is never sniffed.
pub fn load_sources(path: &Path, synthetic: bool) -> Result<Vec<LeafSource>> {
    let content = fs::read_to_string(path).context("Failed to open input file")?;
    let sources = if synthetic {
        let amounts: Vec<String> =
            serde_json::from_str(&content).context("Expected an array of amount strings")?;
        amounts
            .into_iter()
            .map(|amount| LeafSource::Synthetic { amount })
            .collect()
    } else {
        let entries: Vec<ExplicitInput> = serde_json::from_str(&content)
            .context("Expected an array of {address, amount} objects")?;
        entries
            .into_iter()
            .map(|entry| LeafSource::Explicit {
                address: entry.address,
                amount: entry.amount,
            })
            .collect()
    };
    Ok(sources)
}

pub fn run(cli: &Cli, config: &EngineConfig) -> Result<()> {
    println!("Reading entries from {:?}...", cli.input);
    let sources = load_sources(&cli.input, cli.synthetic)?;

    let entries = resolve_all(&sources).context("Invalid entry")?;
    let total = entries.iter().try_fold(0u128, |total, entry| -> Result<u128> {
        let amount = parse_amount(&entry.amount)?;
        total
            .checked_add(amount)
            .context("Total amount overflows u128")
    })?;
    println!("Total entries: {}", entries.len());

    println!("Building Merkle tree...");
    let leaves = entries.iter().map(|entry| entry.leaf).collect();
    let tree = MerkleTree::build_with(leaves, config.tree.allow_duplicate_leaves)
        .context("Failed to build Merkle tree")?;

    let root = hex_encode(tree.root());
    println!("Merkle root: {root}");
    println!("Total amount: {total}");

    let distribution = DistributionFile::from_tree(cli.airdrop_id, &entries, &tree)?;
    println!("Writing distribution file to {:?}...", cli.output);
    distribution
        .save(&cli.output)
        .context("Failed to write distribution file")?;

    if let Some(root_path) = &cli.root_output {
        write_file_atomic(root_path, &format!("{root}\n")).context("Failed to write root")?;
    }

    println!("Done!");
    Ok(())
}

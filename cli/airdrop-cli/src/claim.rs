use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use k256::ecdsa::SigningKey;
use merkle_airdrop::{
    hex_encode, sign_assertion, signer_pub_bytes, write_file_atomic, ClaimAssertion,
    DistributionFile,
};
use serde::Serialize;
use zeroize::Zeroize;

#[derive(Args, Debug)]
pub struct Cli {
    /// Distribution file produced by build-tree
    #[arg(short = 'd', long)]
    distribution: PathBuf,

    /// Address of the entry to sign
    #[arg(short = 'a', long)]
    address: String,

    /// Claim key printed on the voucher
    #[arg(short = 'c', long)]
    claim_key: String,

    /// Airdrop signer private key (hex format, with or without 0x prefix)
    /// Alternatively, use "-" to read from stdin (more secure)
    #[arg(short = 'k', long)]
    private_key: String,

    /// Output voucher JSON file
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoucherOutput {
    airdrop_id: u64,
    claim_key: String,
    address: String,
    amount: String,
    merkle_root: String,
    merkle_proof: Vec<String>,
    signature: String,
    signer_pub: String,
}

/// Parses a 32-byte secp256k1 private key from hex, wiping intermediates.
fn parse_signing_key(key_str: &str) -> Result<SigningKey> {
    let key_str = key_str.trim();
    let key_str = key_str.strip_prefix("0x").unwrap_or(key_str);
    if key_str.is_empty() {
        anyhow::bail!("Private key is empty");
    }
    let mut key_bytes = hex::decode(key_str).context("Invalid private key format")?;
    if key_bytes.len() != 32 {
        let len = key_bytes.len();
        key_bytes.zeroize();
        anyhow::bail!("Invalid private key length: expected 32 bytes, got {}", len);
    }
    let signing_key = SigningKey::from_slice(&key_bytes).context("Invalid private key");
    key_bytes.zeroize();
    signing_key
}

fn read_private_key(arg: &str) -> Result<SigningKey> {
    if arg != "-" {
        return parse_signing_key(arg);
    }
    let mut buffer = String::new();
    std::io::stdin()
        .read_line(&mut buffer)
        .context("Failed to read private key from stdin")?;
    let signing_key = parse_signing_key(&buffer);
    buffer.zeroize();
    signing_key
}

pub fn run(mut cli: Cli) -> Result<()> {
    println!("Loading distribution file...");
    let distribution =
        DistributionFile::load(&cli.distribution).context("Failed to load distribution file")?;

    println!("Looking up address in distribution...");
    let entry = distribution
        .find(&cli.address)
        .context("Address not found in distribution")?;
    if !entry.verify().context("Malformed distribution entry")? {
        anyhow::bail!("Merkle proof for {} does not match its root", entry.address);
    }

    println!("Parsing private key...");
    let signing_key = read_private_key(&cli.private_key)?;
    cli.private_key.zeroize();

    let proof = entry.proof()?;
    let assertion = ClaimAssertion {
        airdrop_id: distribution.airdrop_id,
        claim_key: &cli.claim_key,
        amount: &entry.amount,
        leaf: entry.leaf()?,
        proof: &proof,
    };

    println!("Signing claim assertion...");
    let signature = sign_assertion(&signing_key, &assertion)?;

    let voucher = VoucherOutput {
        airdrop_id: distribution.airdrop_id,
        claim_key: cli.claim_key.clone(),
        address: entry.address.clone(),
        amount: entry.amount.clone(),
        merkle_root: entry.merkle_root.clone(),
        merkle_proof: entry.merkle_proof.clone(),
        signature: hex_encode(signature),
        signer_pub: hex_encode(signer_pub_bytes(&signing_key)),
    };

    println!("Writing voucher JSON to {:?}...", cli.output);
    let json_output = serde_json::to_string_pretty(&voucher).context("Failed to serialize JSON")?;
    write_file_atomic(&cli.output, &json_output).context("Failed to write voucher file")?;

    println!("\nVoucher generated successfully!");
    println!("Claim key: {}", voucher.claim_key);
    println!("Amount: {}", voucher.amount);
    println!("Signer public key: {}", voucher.signer_pub);

    Ok(())
}

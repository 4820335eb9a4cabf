use std::fs::File;
use std::io::Write;
use std::path::Path;

use sha3::{Digest, Keccak256};

use crate::error::{AirdropError, Result};

/// A 32-byte Keccak256 digest.
pub type Hash = [u8; 32];

/// Parses an Ethereum address from a hex string.
///
/// # Arguments
/// * `addr_str` - The address string, with or without "0x" prefix
///
/// # Returns
/// A 20-byte array representing the address
///
/// # Errors
/// Returns `InvalidAddress` if the address is not 40 hex characters, contains
/// invalid hex, or is the zero address
pub fn parse_address(addr_str: &str) -> Result<[u8; 20]> {
    let trimmed = addr_str.trim();
    let cleaned = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if cleaned.len() != 40 {
        return Err(AirdropError::InvalidAddress(format!(
            "expected 40 hex chars, got {}",
            cleaned.len()
        )));
    }
    let mut address = [0u8; 20];
    hex::decode_to_slice(cleaned, &mut address)
        .map_err(|e| AirdropError::InvalidAddress(format!("{addr_str}: {e}")))?;
    if address == [0u8; 20] {
        return Err(AirdropError::InvalidAddress(
            "zero address not allowed".to_string(),
        ));
    }
    Ok(address)
}

/// Canonical textual form of an address: lowercase hex with a "0x" prefix.
pub fn canonical_address(addr_str: &str) -> Result<String> {
    let address = parse_address(addr_str)?;
    Ok(format!("0x{}", hex::encode(address)))
}

/// Parses a smallest-denomination amount.
///
/// Accepts plain base-10 digits only: no sign, no separators, no leading
/// zeros (except "0" itself), and the value must fit in a `u128`.
pub fn parse_amount(amount: &str) -> Result<u128> {
    if amount.is_empty() {
        return Err(AirdropError::InvalidAmount("empty amount".to_string()));
    }
    if !amount.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AirdropError::InvalidAmount(format!(
            "{amount}: only digits are allowed"
        )));
    }
    if amount.len() > 1 && amount.starts_with('0') {
        return Err(AirdropError::InvalidAmount(format!(
            "{amount}: leading zeros are not allowed"
        )));
    }
    amount
        .parse::<u128>()
        .map_err(|e| AirdropError::InvalidAmount(format!("{amount}: {e}")))
}

/// Computes the Keccak256 hash of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> Hash {
    Keccak256::digest(data).into()
}

/// Hashes two nodes in byte-lexicographic order.
///
/// The smaller digest always goes first, so the parent does not depend on
/// which child sits on the left.
pub fn hash_sorted_pair(a: &Hash, b: &Hash) -> Hash {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    Keccak256::new()
        .chain_update(first)
        .chain_update(second)
        .finalize()
        .into()
}

/// Lowercase hex without a "0x" prefix.
pub fn hex_encode(bytes: impl AsRef<[u8]>) -> String {
    hex::encode(bytes)
}

/// Parses a 32-byte digest from hex, with or without "0x" prefix.
pub fn parse_hash(hash_str: &str) -> Result<Hash> {
    let trimmed = hash_str.trim();
    let cleaned = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if cleaned.len() != 64 {
        return Err(AirdropError::InvalidHex(format!(
            "expected 64 hex chars, got {}",
            cleaned.len()
        )));
    }
    let mut hash = [0u8; 32];
    hex::decode_to_slice(cleaned, &mut hash)
        .map_err(|e| AirdropError::InvalidHex(format!("{hash_str}: {e}")))?;
    Ok(hash)
}

/// Parses variable-length hex bytes, with or without "0x" prefix.
pub fn parse_hex_bytes(hex_str: &str) -> Result<Vec<u8>> {
    let trimmed = hex_str.trim();
    let cleaned = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(cleaned).map_err(|e| AirdropError::InvalidHex(format!("{hex_str}: {e}")))
}

/// Writes `contents` to `path` through a temporary sibling file and a rename,
/// so readers never observe a half-written file.
pub fn write_file_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    file.sync_all()?;
    std::fs::rename(&temp_path, path)
}

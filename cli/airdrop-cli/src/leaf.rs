//! Canonical leaf encoding.
//!
//! A leaf commits one `(recipient, amount)` entitlement as
//! `keccak256("{recipient}:{amount}")`, where the recipient is the canonical
//! lowercase `0x` address and the amount is a plain base-10 string.

use serde::{Deserialize, Serialize};

use crate::common::{canonical_address, keccak256, parse_amount, Hash};
use crate::error::Result;

/// Encodes a `(recipient, amount)` pair into its leaf digest.
///
/// # Errors
/// `InvalidAddress` for malformed recipients, `InvalidAmount` for amounts that
/// are not canonical base-10 integers.
pub fn encode_leaf(recipient: &str, amount: &str) -> Result<Hash> {
    let recipient = canonical_address(recipient)?;
    parse_amount(amount)?;
    Ok(keccak256(format!("{recipient}:{amount}").as_bytes()))
}

/// One entry of the tree-building input.
///
/// `Synthetic` entries carry no identity; a random address-format key is
/// generated for them when resolved. They only make sense for bearer
/// airdrops, where redemption is authorized by signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LeafSource {
    Explicit { address: String, amount: String },
    Synthetic { amount: String },
}

/// A validated entry: canonical address, amount and leaf digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLeaf {
    pub address: String,
    pub amount: String,
    pub leaf: Hash,
}

impl LeafSource {
    pub fn amount(&self) -> &str {
        match self {
            Self::Explicit { amount, .. } | Self::Synthetic { amount } => amount,
        }
    }

    /// Validates the entry and computes its leaf.
    pub fn resolve(&self) -> Result<ResolvedLeaf> {
        let address = match self {
            Self::Explicit { address, .. } => canonical_address(address)?,
            Self::Synthetic { .. } => synthetic_address(),
        };
        let amount = self.amount().to_string();
        let leaf = encode_leaf(&address, &amount)?;
        Ok(ResolvedLeaf {
            address,
            amount,
            leaf,
        })
    }
}

/// Resolves a whole batch, failing on the first invalid entry.
pub fn resolve_all(sources: &[LeafSource]) -> Result<Vec<ResolvedLeaf>> {
    sources.iter().map(LeafSource::resolve).collect()
}

fn synthetic_address() -> String {
    loop {
        let bytes: [u8; 20] = rand::random();
        if bytes != [0u8; 20] {
            return format!("0x{}", hex::encode(bytes));
        }
    }
}

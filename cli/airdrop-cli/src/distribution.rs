//! The out-of-band proof file handed to recipients.
//!
//! ```json
//! { "airdropId": 1, "proofs": [
//!   { "address": "0x..", "amount": "100",
//!     "merkleRoot": "<hex>", "merkleProof": ["<hex>", ..] } ] }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::{canonical_address, hex_encode, parse_hash, write_file_atomic, Hash};
use crate::error::{AirdropError, Result};
use crate::leaf::{encode_leaf, ResolvedLeaf};
use crate::merkle::{verify_proof, MerkleTree};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionFile {
    pub airdrop_id: u64,
    pub proofs: Vec<ProofEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofEntry {
    pub address: String,
    pub amount: String,
    pub merkle_root: String,
    pub merkle_proof: Vec<String>,
}

impl ProofEntry {
    pub fn root(&self) -> Result<Hash> {
        parse_hash(&self.merkle_root)
    }

    pub fn proof(&self) -> Result<Vec<Hash>> {
        self.merkle_proof.iter().map(|h| parse_hash(h)).collect()
    }

    pub fn leaf(&self) -> Result<Hash> {
        encode_leaf(&self.address, &self.amount)
    }

    /// Recomputes the root from this entry and compares.
    pub fn verify(&self) -> Result<bool> {
        Ok(verify_proof(&self.leaf()?, &self.proof()?, &self.root()?))
    }
}

/// Outcome of checking a whole file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub valid: usize,
    /// Indices of entries whose proof does not lead to their root.
    pub invalid: Vec<usize>,
}

impl VerificationReport {
    pub fn all_valid(&self) -> bool {
        self.invalid.is_empty()
    }
}

impl DistributionFile {
    /// Pairs each resolved leaf with its proof. `entries` must be in the
    /// order the tree was built from.
    pub fn from_tree(
        airdrop_id: u64,
        entries: &[ResolvedLeaf],
        tree: &MerkleTree,
    ) -> Result<Self> {
        if entries.len() != tree.len() {
            return Err(AirdropError::LeafCountMismatch {
                entries: entries.len(),
                leaves: tree.len(),
            });
        }
        let merkle_root = hex_encode(tree.root());
        let proofs = entries
            .iter()
            .zip(tree.proofs())
            .map(|(entry, proof)| ProofEntry {
                address: entry.address.clone(),
                amount: entry.amount.clone(),
                merkle_root: merkle_root.clone(),
                merkle_proof: proof.iter().map(hex_encode).collect(),
            })
            .collect();
        Ok(Self { airdrop_id, proofs })
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_file_atomic(path, &json)?;
        Ok(())
    }

    /// First entry for `address`, compared in canonical form.
    pub fn find(&self, address: &str) -> Result<&ProofEntry> {
        let wanted = canonical_address(address)?;
        self.proofs
            .iter()
            .find(|entry| {
                canonical_address(&entry.address).ok().as_deref() == Some(wanted.as_str())
            })
            .ok_or_else(|| AirdropError::NotFound(format!("address {address}")))
    }

    /// Checks every entry; malformed entries count as invalid.
    pub fn verify_all(&self) -> VerificationReport {
        let mut report = VerificationReport::default();
        for (index, entry) in self.proofs.iter().enumerate() {
            match entry.verify() {
                Ok(true) => report.valid += 1,
                _ => report.invalid.push(index),
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::{resolve_all, LeafSource};

    fn sources() -> Vec<LeafSource> {
        [
            "0x1111111111111111111111111111111111111111",
            "0xBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB",
            "0x3333333333333333333333333333333333333333",
        ]
        .iter()
        .zip(["100", "200", "300"])
        .map(|(address, amount)| LeafSource::Explicit {
            address: address.to_string(),
            amount: amount.to_string(),
        })
        .collect()
    }

    fn file() -> DistributionFile {
        let entries = resolve_all(&sources()).unwrap();
        let tree = MerkleTree::build(entries.iter().map(|e| e.leaf).collect()).unwrap();
        DistributionFile::from_tree(7, &entries, &tree).unwrap()
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(file()).unwrap();
        assert_eq!(json["airdropId"], 7);
        let entry = &json["proofs"][2];
        assert_eq!(entry["amount"], "300");
        assert_eq!(entry["merkleProof"].as_array().unwrap().len(), 1);
        assert!(!entry["merkleRoot"].as_str().unwrap().starts_with("0x"));
    }

    #[test]
    fn test_verify_all_and_tamper() {
        let mut file = file();
        assert!(file.verify_all().all_valid());
        assert_eq!(file.verify_all().valid, 3);

        file.proofs[1].amount = "201".to_string();
        file.proofs[2].merkle_proof[0] = "zz".to_string();
        let report = file.verify_all();
        assert_eq!(report.valid, 1);
        assert_eq!(report.invalid, vec![1, 2]);
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let file = file();
        assert_eq!(file.proofs[1].address, "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
        let entry = file.find("BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB").unwrap();
        assert_eq!(entry.amount, "200");
        assert!(matches!(
            file.find("0x4444444444444444444444444444444444444444"),
            Err(AirdropError::NotFound(_))
        ));
    }

    #[test]
    fn test_from_tree_rejects_mismatched_entries() {
        let entries = resolve_all(&sources()).unwrap();
        let tree = MerkleTree::build(entries.iter().map(|e| e.leaf).collect()).unwrap();
        assert_eq!(
            DistributionFile::from_tree(7, &entries[..2], &tree),
            Err(AirdropError::LeafCountMismatch {
                entries: 2,
                leaves: 3
            })
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proofs.json");
        let original = file();
        original.save(&path).unwrap();
        assert_eq!(DistributionFile::load(&path).unwrap(), original);
    }
}

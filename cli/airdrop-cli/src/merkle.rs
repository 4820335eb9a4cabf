//! Sorted-pair Merkle tree construction and proof verification.
//!
//! Parents are `keccak256(min(a, b) || max(a, b))`. An unpaired last node is
//! carried up unchanged, never duplicated. Proofs are plain sibling lists
//! without direction bits.

use std::collections::HashSet;

use tracing::debug;

use crate::common::{hash_sorted_pair, keccak256, Hash};
use crate::error::{AirdropError, Result};

/// A fully materialized tree, level 0 being the leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Builds a tree, rejecting duplicate leaves.
    pub fn build(leaves: Vec<Hash>) -> Result<Self> {
        Self::build_with(leaves, false)
    }

    /// Builds a tree from leaves in caller order.
    ///
    /// # Errors
    /// `EmptyAirdrop` for no leaves; `DuplicateLeaf` for a repeated digest
    /// unless `allow_duplicate_leaves` is set.
    pub fn build_with(leaves: Vec<Hash>, allow_duplicate_leaves: bool) -> Result<Self> {
        if leaves.is_empty() {
            return Err(AirdropError::EmptyAirdrop);
        }
        if !allow_duplicate_leaves {
            let mut seen = HashSet::with_capacity(leaves.len());
            for (index, leaf) in leaves.iter().enumerate() {
                if !seen.insert(*leaf) {
                    return Err(AirdropError::DuplicateLeaf { index });
                }
            }
        }

        let mut levels: Vec<Vec<Hash>> = vec![leaves];
        loop {
            let level = &levels[levels.len() - 1];
            if level.len() <= 1 {
                break;
            }
            let next_level: Vec<Hash> = level
                .chunks(2)
                .map(|chunk| match chunk {
                    [a, b] => hash_sorted_pair(a, b),
                    // odd node goes up as is
                    _ => chunk[0],
                })
                .collect();
            levels.push(next_level);
        }

        debug!(
            leaves = levels[0].len(),
            depth = levels.len() - 1,
            "built merkle tree"
        );
        Ok(Self { levels })
    }

    pub fn root(&self) -> Hash {
        // build_with guarantees a non-empty top level
        self.levels[self.levels.len() - 1][0]
    }

    pub fn leaves(&self) -> &[Hash] {
        &self.levels[0]
    }

    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    pub fn levels(&self) -> &[Vec<Hash>] {
        &self.levels
    }

    /// Sibling path from leaf `leaf_index` up to the root.
    ///
    /// Levels where the node was carried up unpaired contribute nothing.
    pub fn proof(&self, leaf_index: usize) -> Result<Vec<Hash>> {
        if leaf_index >= self.len() {
            return Err(AirdropError::LeafIndexOutOfRange {
                index: leaf_index,
                len: self.len(),
            });
        }

        Ok(self.sibling_path(leaf_index))
    }

    /// Proofs for every leaf, in leaf order.
    pub fn proofs(&self) -> Vec<Vec<Hash>> {
        (0..self.len()).map(|index| self.sibling_path(index)).collect()
    }

    /// Caller guarantees `leaf_index < self.len()`.
    fn sibling_path(&self, leaf_index: usize) -> Vec<Hash> {
        let mut proof = Vec::with_capacity(self.levels.len());
        let mut current_index = leaf_index;

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_index = current_index ^ 1;
            if let Some(sibling) = level.get(sibling_index) {
                proof.push(*sibling);
            }
            current_index /= 2;
        }

        proof
    }
}

/// Folds `proof` onto `leaf` and returns the resulting root.
pub fn compute_root(leaf: &Hash, proof: &[Hash]) -> Hash {
    proof
        .iter()
        .fold(*leaf, |acc, sibling| hash_sorted_pair(&acc, sibling))
}

/// Accepts iff `proof` leads from `leaf` to `expected_root`.
pub fn verify_proof(leaf: &Hash, proof: &[Hash], expected_root: &Hash) -> bool {
    compute_root(leaf, proof) == *expected_root
}

/// Digest of a proof, used to bind a proof into a signed assertion.
pub fn proof_digest(proof: &[Hash]) -> Hash {
    keccak256(&proof.concat())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: u8) -> Vec<Hash> {
        (1..=n).map(|i| keccak256(&[i])).collect()
    }

    #[test]
    fn test_empty_tree_is_rejected() {
        assert_eq!(MerkleTree::build(vec![]), Err(AirdropError::EmptyAirdrop));
    }

    #[test]
    fn test_single_leaf() {
        let leaf = [42u8; 32];
        let tree = MerkleTree::build(vec![leaf]).unwrap();
        assert_eq!(tree.root(), leaf);
        assert!(tree.proof(0).unwrap().is_empty());
        assert!(verify_proof(&leaf, &[], &leaf));
    }

    #[test]
    fn test_two_leaves() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let tree = MerkleTree::build(vec![b, a]).unwrap();
        let mut concatenated = a.to_vec();
        concatenated.extend_from_slice(&b);
        assert_eq!(tree.root(), keccak256(&concatenated));
        assert_eq!(tree.proof(0).unwrap(), vec![a]);
        assert_eq!(tree.proof(1).unwrap(), vec![b]);
    }

    #[test]
    fn test_three_leaves_carry_odd_node() {
        let l = leaves(3);
        let tree = MerkleTree::build(l.clone()).unwrap();
        let node_ab = hash_sorted_pair(&l[0], &l[1]);

        assert_eq!(tree.levels().len(), 3);
        assert_eq!(tree.levels()[1], vec![node_ab, l[2]]);
        assert_eq!(tree.root(), hash_sorted_pair(&node_ab, &l[2]));
        assert_eq!(tree.proof(0).unwrap(), vec![l[1], l[2]]);
        assert_eq!(tree.proof(1).unwrap(), vec![l[0], l[2]]);
        assert_eq!(tree.proof(2).unwrap(), vec![node_ab]);
    }

    #[test]
    fn test_every_proof_verifies() {
        for n in 1..=17u8 {
            let tree = MerkleTree::build(leaves(n)).unwrap();
            for (index, proof) in tree.proofs().iter().enumerate() {
                assert!(
                    verify_proof(&tree.leaves()[index], proof, &tree.root()),
                    "leaf {index} of {n}"
                );
            }
        }
    }

    #[test]
    fn test_proofs_match_single_proofs() {
        for n in [1u8, 2, 5, 8] {
            let tree = MerkleTree::build(leaves(n)).unwrap();
            let all = tree.proofs();
            assert_eq!(all.len(), usize::from(n));
            for (index, proof) in all.iter().enumerate() {
                assert_eq!(*proof, tree.proof(index).unwrap());
            }
            if n > 1 {
                assert!(all.iter().all(|proof| !proof.is_empty()));
            }
        }
    }

    #[test]
    fn test_proof_out_of_bounds() {
        let tree = MerkleTree::build(leaves(2)).unwrap();
        assert_eq!(
            tree.proof(5),
            Err(AirdropError::LeafIndexOutOfRange { index: 5, len: 2 })
        );
    }

    #[test]
    fn test_duplicate_leaf_policy() {
        let mut l = leaves(3);
        l.push(l[1]);
        assert_eq!(
            MerkleTree::build(l.clone()),
            Err(AirdropError::DuplicateLeaf { index: 3 })
        );

        let tree = MerkleTree::build_with(l.clone(), true).unwrap();
        assert!(verify_proof(&l[3], &tree.proof(3).unwrap(), &tree.root()));
    }

    #[test]
    fn test_tampered_proof_fails() {
        let l = leaves(5);
        let tree = MerkleTree::build(l.clone()).unwrap();
        let mut proof = tree.proof(0).unwrap();
        proof[1][0] ^= 1;
        assert!(!verify_proof(&l[0], &proof, &tree.root()));
    }

    #[test]
    fn test_proof_digest_depends_on_order() {
        let l = leaves(2);
        assert_ne!(proof_digest(&[l[0], l[1]]), proof_digest(&[l[1], l[0]]));
        assert_eq!(proof_digest(&[]), keccak256(&[]));
    }
}

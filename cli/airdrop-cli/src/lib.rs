//! Merkle airdrop engine.
//!
//! An operator commits a list of `(recipient, amount)` entitlements to a
//! single sorted-pair Merkle root, registers it as an airdrop, and hands out
//! per-recipient proofs. Claims are checked against the root and recorded
//! exactly once. Bearer airdrops additionally require the creator's
//! detached ECDSA signature over the claim.

#![forbid(unsafe_code)]

pub mod bearer;
pub mod clock;
pub mod common;
pub mod config;
pub mod distribution;
pub mod error;
pub mod leaf;
pub mod ledger;
pub mod merkle;
pub mod registry;

pub use bearer::{sign_assertion, signer_pub_bytes, verify_bearer_signature, ClaimAssertion};
pub use clock::{Clock, FixedClock, SystemClock};
pub use common::{
    canonical_address, hash_sorted_pair, hex_encode, keccak256, parse_address, parse_amount,
    parse_hash, parse_hex_bytes, write_file_atomic, Hash,
};
pub use config::{ConfigError, EngineConfig};
pub use distribution::{DistributionFile, ProofEntry, VerificationReport};
pub use error::{AirdropError, Result};
pub use leaf::{encode_leaf, resolve_all, LeafSource, ResolvedLeaf};
pub use ledger::{
    AuthorizeOnly, ClaimAuthorization, ClaimLedger, ClaimRequest, ClaimVerdict, Disburser,
};
pub use merkle::{compute_root, proof_digest, verify_proof, MerkleTree};
pub use registry::{
    Airdrop, AirdropKind, AirdropRegistry, Claim, ListFilter, NewAirdrop, Order, Page,
};

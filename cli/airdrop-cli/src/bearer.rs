//! Detached-signature authorization for bearer claims.
//!
//! The creator signs a canonical claim assertion off-chain; anyone holding
//! the signature may redeem it. Signatures are secp256k1 ECDSA over the
//! Keccak256 digest of the assertion bytes.

use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};

use crate::common::{keccak256, Hash};
use crate::error::{AirdropError, Result};
use crate::merkle::proof_digest;

/// Domain separator prefixed to every assertion.
const ASSERTION_DOMAIN: &[u8] = b"merkle-airdrop/bearer-claim/v1";

/// The statement a bearer signature vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimAssertion<'a> {
    pub airdrop_id: u64,
    pub claim_key: &'a str,
    pub amount: &'a str,
    pub leaf: Hash,
    pub proof: &'a [Hash],
}

impl ClaimAssertion<'_> {
    /// Deterministic encoding in fixed field order.
    ///
    /// Variable-length fields are length-prefixed so no field can bleed into
    /// its neighbour.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(
            ASSERTION_DOMAIN.len() + 8 + 8 + self.claim_key.len() + self.amount.len() + 64,
        );
        bytes.extend_from_slice(ASSERTION_DOMAIN);
        bytes.extend_from_slice(&self.airdrop_id.to_be_bytes());
        bytes.extend_from_slice(&(self.claim_key.len() as u32).to_be_bytes());
        bytes.extend_from_slice(self.claim_key.as_bytes());
        bytes.extend_from_slice(&(self.amount.len() as u32).to_be_bytes());
        bytes.extend_from_slice(self.amount.as_bytes());
        bytes.extend_from_slice(&self.leaf);
        bytes.extend_from_slice(&proof_digest(self.proof));
        bytes
    }

    pub fn digest(&self) -> Hash {
        keccak256(&self.canonical_bytes())
    }
}

/// Parses a SEC1-encoded secp256k1 public key (compressed or uncompressed).
pub fn parse_signer_pub(signer_pub: &[u8]) -> Result<VerifyingKey> {
    VerifyingKey::from_sec1_bytes(signer_pub).map_err(|_| AirdropError::InvalidPublicKey)
}

/// Verifies a 64-byte compact signature over the assertion.
///
/// Returns `InvalidSignature` for malformed signatures as well as for
/// signatures that do not verify, and `InvalidPublicKey` if the key itself
/// does not parse.
pub fn verify_bearer_signature(
    assertion: &ClaimAssertion<'_>,
    signature: &[u8],
    signer_pub: &[u8],
) -> Result<()> {
    let verifying_key = parse_signer_pub(signer_pub)?;
    let signature = Signature::from_slice(signature).map_err(|_| AirdropError::InvalidSignature)?;
    verifying_key
        .verify_prehash(&assertion.digest(), &signature)
        .map_err(|_| AirdropError::InvalidSignature)
}

/// Signs an assertion, producing a 64-byte compact signature.
///
/// Used by the off-chain voucher tool; the verification path never needs it.
pub fn sign_assertion(signing_key: &SigningKey, assertion: &ClaimAssertion<'_>) -> Result<[u8; 64]> {
    let signature: Signature = signing_key
        .sign_prehash(&assertion.digest())
        .map_err(|_| AirdropError::InvalidSignature)?;
    let mut compact = [0u8; 64];
    compact.copy_from_slice(&signature.to_bytes());
    Ok(compact)
}

/// Compressed SEC1 public key for a signing key.
pub fn signer_pub_bytes(signing_key: &SigningKey) -> Vec<u8> {
    signing_key
        .verifying_key()
        .to_encoded_point(true)
        .as_bytes()
        .to_vec()
}

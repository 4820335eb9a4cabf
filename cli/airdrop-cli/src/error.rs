use thiserror::Error;

/// Every failure the airdrop engine can report.
///
/// Build-time, registry and claim-time failures share one enum so that a
/// claim verdict can carry the exact rejection reason back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AirdropError {
    // build time
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("airdrop has no leaves")]
    EmptyAirdrop,
    #[error("duplicate leaf at index {index}")]
    DuplicateLeaf { index: usize },
    #[error("leaf index {index} is out of bounds for tree with {len} leaves")]
    LeafIndexOutOfRange { index: usize, len: usize },
    #[error("{entries} entries do not match a tree of {leaves} leaves")]
    LeafCountMismatch { entries: usize, leaves: usize },
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    // registry
    #[error("label already registered: {0}")]
    DuplicateLabel(String),
    #[error("invalid label: {0}")]
    InvalidLabel(String),
    #[error("bearer airdrop requires a signer public key")]
    MissingSigner,
    #[error("open airdrop must not carry a signer public key")]
    UnexpectedSigner,
    #[error("invalid signer public key")]
    InvalidPublicKey,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0} is not the creator of airdrop {1}")]
    Unauthorized(String, u64),
    #[error("page limit must be at least 1")]
    InvalidLimit,
    #[error("invalid pagination cursor: {0}")]
    InvalidCursor(String),

    // claim time
    #[error("airdrop {0} is closed")]
    AirdropClosed(u64),
    #[error("claim key {claim_key} already claimed in airdrop {airdrop_id}")]
    AlreadyClaimed { airdrop_id: u64, claim_key: String },
    #[error("merkle proof does not match the airdrop root")]
    InvalidProof,
    #[error("bearer signature verification failed")]
    InvalidSignature,
    #[error("claim of {amount} exceeds remaining allocation {remaining}")]
    AllocationExceeded { amount: u128, remaining: u128 },
    #[error("bearer claim requires a claim key")]
    MissingClaimKey,
    #[error("claim key {0} does not match the recipient")]
    ClaimKeyMismatch(String),
    #[error("open claims pay out to the recipient only")]
    UnexpectedBeneficiary,
    #[error("disbursement failed: {0}")]
    DisbursementFailed(String),
}

pub type Result<T> = std::result::Result<T, AirdropError>;

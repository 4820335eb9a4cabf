//! Claim redemption.
//!
//! Every check and the commit for one airdrop run under that airdrop's
//! record lock, so two redemptions of the same claim key can never both
//! pass the "not yet claimed" check. A failed redemption leaves the ledger
//! untouched.

use std::ops::Bound;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bearer::{verify_bearer_signature, ClaimAssertion};
use crate::common::{canonical_address, parse_amount, Hash};
use crate::error::{AirdropError, Result};
use crate::leaf::encode_leaf;
use crate::merkle::verify_proof;
use crate::registry::{AirdropKind, AirdropRecord, AirdropRegistry, Claim, Page};

/// A redemption request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    pub airdrop_id: u64,
    /// Required for bearer airdrops. For open airdrops it is derived from
    /// the recipient and, if given, must equal the canonical recipient.
    pub claim_key: Option<String>,
    /// Address committed in the leaf.
    pub recipient: String,
    pub amount: String,
    pub proof: Vec<Hash>,
    /// 64-byte compact signature, bearer airdrops only.
    pub signature: Option<Vec<u8>>,
    /// Payout address for bearer claims; defaults to `recipient`.
    pub beneficiary: Option<String>,
}

impl ClaimRequest {
    /// An open claim by the recipient itself.
    pub fn open(airdrop_id: u64, recipient: &str, amount: &str, proof: Vec<Hash>) -> Self {
        Self {
            airdrop_id,
            claim_key: None,
            recipient: recipient.to_string(),
            amount: amount.to_string(),
            proof,
            signature: None,
            beneficiary: None,
        }
    }

    /// A bearer claim authorized by `signature`.
    pub fn bearer(
        airdrop_id: u64,
        claim_key: &str,
        recipient: &str,
        amount: &str,
        proof: Vec<Hash>,
        signature: Vec<u8>,
    ) -> Self {
        Self {
            airdrop_id,
            claim_key: Some(claim_key.to_string()),
            recipient: recipient.to_string(),
            amount: amount.to_string(),
            proof,
            signature: Some(signature),
            beneficiary: None,
        }
    }

    pub fn with_beneficiary(mut self, beneficiary: &str) -> Self {
        self.beneficiary = Some(beneficiary.to_string());
        self
    }
}

/// What a successful redemption authorizes: moving `amount` of `denom`
/// to `beneficiary`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimAuthorization {
    pub airdrop_id: u64,
    pub claim_key: String,
    pub beneficiary: String,
    pub denom: String,
    pub amount: u128,
}

/// Result of a dry-run check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimVerdict {
    pub valid: bool,
    pub reason: Option<AirdropError>,
}

/// Moves funds once a claim is authorized.
///
/// Called while the airdrop is locked and before the claim is recorded; an
/// error aborts the redemption.
pub trait Disburser: Send + Sync {
    fn disburse(
        &self,
        authorization: &ClaimAuthorization,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Records claims without moving anything; the caller performs the transfer
/// from the returned authorization.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthorizeOnly;

impl Disburser for AuthorizeOnly {
    fn disburse(
        &self,
        _authorization: &ClaimAuthorization,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

pub struct ClaimLedger {
    registry: Arc<AirdropRegistry>,
    disburser: Arc<dyn Disburser>,
}

impl ClaimLedger {
    pub fn new(registry: Arc<AirdropRegistry>) -> Self {
        Self::with_disburser(registry, Arc::new(AuthorizeOnly))
    }

    pub fn with_disburser(registry: Arc<AirdropRegistry>, disburser: Arc<dyn Disburser>) -> Self {
        Self {
            registry,
            disburser,
        }
    }

    pub fn registry(&self) -> &Arc<AirdropRegistry> {
        &self.registry
    }

    /// Redeems a claim, recording it and bumping `total_claimed` atomically.
    pub fn redeem(&self, request: &ClaimRequest) -> Result<ClaimAuthorization> {
        let record = self.registry.record(request.airdrop_id)?;
        let mut record = record.lock();

        let authorization = match evaluate(&record, request) {
            Ok(authorization) => authorization,
            Err(err) => {
                debug!(airdrop_id = request.airdrop_id, error = %err, "claim rejected");
                return Err(err);
            }
        };

        if let Err(err) = self.disburser.disburse(&authorization) {
            warn!(
                airdrop_id = authorization.airdrop_id,
                claim_key = %authorization.claim_key,
                error = %err,
                "disbursement failed"
            );
            return Err(AirdropError::DisbursementFailed(err.to_string()));
        }

        // evaluate already proved the sum fits
        record.airdrop.total_claimed += authorization.amount;
        record.claims.insert(
            authorization.claim_key.clone(),
            Claim {
                airdrop_id: authorization.airdrop_id,
                claim_key: authorization.claim_key.clone(),
                beneficiary: authorization.beneficiary.clone(),
                amount: authorization.amount,
                claimed_at: self.registry.clock().now(),
            },
        );

        info!(
            airdrop_id = authorization.airdrop_id,
            claim_key = %authorization.claim_key,
            amount = %authorization.amount,
            total_claimed = %record.airdrop.total_claimed,
            "claim redeemed"
        );
        Ok(authorization)
    }

    /// Runs every redemption check without recording anything.
    pub fn verify_claim(&self, request: &ClaimRequest) -> ClaimVerdict {
        let outcome = self
            .registry
            .record(request.airdrop_id)
            .and_then(|record| {
                let record = record.lock();
                evaluate(&record, request)
            });
        match outcome {
            Ok(_) => ClaimVerdict {
                valid: true,
                reason: None,
            },
            Err(reason) => ClaimVerdict {
                valid: false,
                reason: Some(reason),
            },
        }
    }

    pub fn get_claim(&self, airdrop_id: u64, claim_key: &str) -> Result<Claim> {
        let record = self.registry.record(airdrop_id)?;
        let record = record.lock();
        record
            .claims
            .get(claim_key)
            .cloned()
            .ok_or_else(|| AirdropError::NotFound(format!("claim {claim_key} in airdrop {airdrop_id}")))
    }

    pub fn is_claimed(&self, airdrop_id: u64, claim_key: &str) -> Result<bool> {
        let record = self.registry.record(airdrop_id)?;
        let claimed = record.lock().claims.contains_key(claim_key);
        Ok(claimed)
    }

    /// Claims of one airdrop in claim-key order.
    pub fn list_claims(
        &self,
        airdrop_id: u64,
        start_after: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Page<Claim>> {
        let limit = self.registry.page_limit(limit)?;
        let record = self.registry.record(airdrop_id)?;
        let record = record.lock();

        let lower = start_after.map_or(Bound::Unbounded, |key| Bound::Excluded(key.to_string()));
        let mut items: Vec<Claim> = record
            .claims
            .range((lower, Bound::Unbounded))
            .map(|(_, claim)| claim.clone())
            .take(limit + 1)
            .collect();

        let next = if items.len() > limit {
            items.truncate(limit);
            items.last().map(|claim| claim.claim_key.clone())
        } else {
            None
        };
        Ok(Page { items, next })
    }
}

/// Claim checks in order: closed, claim key, already claimed, leaf, proof,
/// signature, allocation. Read-only.
fn evaluate(record: &AirdropRecord, request: &ClaimRequest) -> Result<ClaimAuthorization> {
    let airdrop = &record.airdrop;
    if airdrop.is_closed() {
        return Err(AirdropError::AirdropClosed(airdrop.id));
    }

    let recipient = canonical_address(&request.recipient)?;
    let (claim_key, beneficiary) = match airdrop.kind {
        AirdropKind::Open => {
            if let Some(key) = &request.claim_key {
                if canonical_address(key).ok().as_deref() != Some(recipient.as_str()) {
                    return Err(AirdropError::ClaimKeyMismatch(key.clone()));
                }
            }
            if request.beneficiary.is_some() {
                return Err(AirdropError::UnexpectedBeneficiary);
            }
            (recipient.clone(), recipient.clone())
        }
        AirdropKind::Bearer => {
            let key = request
                .claim_key
                .clone()
                .filter(|key| !key.is_empty())
                .ok_or(AirdropError::MissingClaimKey)?;
            let beneficiary = match &request.beneficiary {
                Some(beneficiary) => canonical_address(beneficiary)?,
                None => recipient.clone(),
            };
            (key, beneficiary)
        }
    };

    if record.claims.contains_key(&claim_key) {
        return Err(AirdropError::AlreadyClaimed {
            airdrop_id: airdrop.id,
            claim_key,
        });
    }

    let amount = parse_amount(&request.amount)?;
    let leaf = encode_leaf(&recipient, &request.amount)?;
    if !verify_proof(&leaf, &request.proof, &airdrop.merkle_root) {
        return Err(AirdropError::InvalidProof);
    }

    if airdrop.kind == AirdropKind::Bearer {
        let signer_pub = airdrop
            .signer_pub
            .as_deref()
            .ok_or(AirdropError::MissingSigner)?;
        let signature = request
            .signature
            .as_deref()
            .ok_or(AirdropError::InvalidSignature)?;
        let assertion = ClaimAssertion {
            airdrop_id: airdrop.id,
            claim_key: &claim_key,
            amount: &request.amount,
            leaf,
            proof: &request.proof,
        };
        verify_bearer_signature(&assertion, signature, signer_pub)?;
    }

    let remaining = airdrop.remaining();
    let fits = airdrop
        .total_claimed
        .checked_add(amount)
        .is_some_and(|total| total <= airdrop.total_amount);
    if !fits {
        return Err(AirdropError::AllocationExceeded { amount, remaining });
    }

    Ok(ClaimAuthorization {
        airdrop_id: airdrop.id,
        claim_key,
        beneficiary,
        denom: airdrop.denom.clone(),
        amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bearer::{sign_assertion, signer_pub_bytes};
    use crate::clock::FixedClock;
    use crate::config::EngineConfig;
    use crate::merkle::MerkleTree;
    use crate::registry::NewAirdrop;
    use k256::ecdsa::SigningKey;
    use parking_lot::Mutex;

    const ALICE: &str = "0xa11ce0000000000000000000000000000000a11c";
    const BOB: &str = "0x2222222222222222222222222222222222222222";
    const CAROL: &str = "0x3333333333333333333333333333333333333333";

    struct Fixture {
        ledger: ClaimLedger,
        tree: MerkleTree,
        airdrop_id: u64,
    }

    fn entries() -> Vec<(&'static str, &'static str)> {
        vec![(ALICE, "100"), (BOB, "200"), (CAROL, "300")]
    }

    fn tree() -> MerkleTree {
        let leaves = entries()
            .iter()
            .map(|(addr, amount)| encode_leaf(addr, amount).unwrap())
            .collect();
        MerkleTree::build(leaves).unwrap()
    }

    fn registry() -> Arc<AirdropRegistry> {
        Arc::new(AirdropRegistry::new(
            &EngineConfig::default(),
            Arc::new(FixedClock::new(500)),
        ))
    }

    fn open_fixture(total_amount: u128) -> Fixture {
        let registry = registry();
        let tree = tree();
        let airdrop = registry
            .create(NewAirdrop {
                kind: AirdropKind::Open,
                denom: "uluna".to_string(),
                merkle_root: tree.root(),
                total_amount,
                creator: "creator".to_string(),
                label: None,
                signer_pub: None,
            })
            .unwrap();
        Fixture {
            ledger: ClaimLedger::new(registry),
            tree,
            airdrop_id: airdrop.id,
        }
    }

    fn claim(f: &Fixture, index: usize) -> ClaimRequest {
        let (addr, amount) = entries()[index];
        ClaimRequest::open(f.airdrop_id, addr, amount, f.tree.proof(index).unwrap())
    }

    #[test]
    fn test_redeem_open_claim() {
        let f = open_fixture(600);
        let authorization = f.ledger.redeem(&claim(&f, 0)).unwrap();
        assert_eq!(
            authorization,
            ClaimAuthorization {
                airdrop_id: f.airdrop_id,
                claim_key: ALICE.to_string(),
                beneficiary: ALICE.to_string(),
                denom: "uluna".to_string(),
                amount: 100,
            }
        );
        assert_eq!(f.ledger.registry().get(f.airdrop_id).unwrap().total_claimed, 100);

        let record = f.ledger.get_claim(f.airdrop_id, ALICE).unwrap();
        assert_eq!(record.amount, 100);
        assert_eq!(record.claimed_at, 500);
        assert!(f.ledger.is_claimed(f.airdrop_id, ALICE).unwrap());
        assert!(!f.ledger.is_claimed(f.airdrop_id, BOB).unwrap());
    }

    #[test]
    fn test_double_claim_rejected() {
        let f = open_fixture(600);
        f.ledger.redeem(&claim(&f, 1)).unwrap();
        assert_eq!(
            f.ledger.redeem(&claim(&f, 1)),
            Err(AirdropError::AlreadyClaimed {
                airdrop_id: f.airdrop_id,
                claim_key: BOB.to_string(),
            })
        );
        assert_eq!(f.ledger.registry().get(f.airdrop_id).unwrap().total_claimed, 200);
    }

    #[test]
    fn test_case_variant_cannot_claim_twice() {
        let f = open_fixture(600);
        f.ledger.redeem(&claim(&f, 0)).unwrap();
        let mut shouted = claim(&f, 0);
        shouted.recipient = ALICE.to_uppercase().replacen("0X", "0x", 1);
        assert!(matches!(
            f.ledger.redeem(&shouted),
            Err(AirdropError::AlreadyClaimed { .. })
        ));
    }

    #[test]
    fn test_wrong_amount_is_invalid_proof() {
        let f = open_fixture(600);
        let mut request = claim(&f, 0);
        request.amount = "150".to_string();
        assert_eq!(f.ledger.redeem(&request), Err(AirdropError::InvalidProof));
        assert_eq!(f.ledger.registry().get(f.airdrop_id).unwrap().total_claimed, 0);
    }

    #[test]
    fn test_allocation_exceeded() {
        let f = open_fixture(250);
        f.ledger.redeem(&claim(&f, 0)).unwrap();
        assert_eq!(
            f.ledger.redeem(&claim(&f, 1)),
            Err(AirdropError::AllocationExceeded {
                amount: 200,
                remaining: 150,
            })
        );
        assert_eq!(f.ledger.registry().get(f.airdrop_id).unwrap().total_claimed, 100);
        assert!(!f.ledger.is_claimed(f.airdrop_id, BOB).unwrap());
    }

    #[test]
    fn test_closed_airdrop_rejects() {
        let f = open_fixture(600);
        f.ledger.registry().close(f.airdrop_id, "creator").unwrap();
        assert_eq!(
            f.ledger.redeem(&claim(&f, 2)),
            Err(AirdropError::AirdropClosed(f.airdrop_id))
        );
    }

    #[test]
    fn test_unknown_airdrop() {
        let f = open_fixture(600);
        let mut request = claim(&f, 0);
        request.airdrop_id = 42;
        assert!(matches!(f.ledger.redeem(&request), Err(AirdropError::NotFound(_))));
    }

    #[test]
    fn test_open_claim_key_rules() {
        let f = open_fixture(600);
        let mut request = claim(&f, 0);
        request.claim_key = Some("voucher".to_string());
        assert_eq!(
            f.ledger.redeem(&request),
            Err(AirdropError::ClaimKeyMismatch("voucher".to_string()))
        );

        let redirected = claim(&f, 0).with_beneficiary(BOB);
        assert_eq!(
            f.ledger.redeem(&redirected),
            Err(AirdropError::UnexpectedBeneficiary)
        );

        let mut explicit = claim(&f, 0);
        explicit.claim_key = Some(ALICE.to_string());
        assert!(f.ledger.redeem(&explicit).is_ok());
    }

    #[test]
    fn test_verify_claim_does_not_mutate() {
        let f = open_fixture(600);
        let request = claim(&f, 2);
        let verdict = f.ledger.verify_claim(&request);
        assert_eq!(verdict, ClaimVerdict { valid: true, reason: None });
        assert!(!f.ledger.is_claimed(f.airdrop_id, CAROL).unwrap());

        f.ledger.redeem(&request).unwrap();
        let verdict = f.ledger.verify_claim(&request);
        assert!(!verdict.valid);
        assert!(matches!(verdict.reason, Some(AirdropError::AlreadyClaimed { .. })));
    }

    #[test]
    fn test_list_claims_pages() {
        let f = open_fixture(600);
        for index in [2, 0, 1] {
            f.ledger.redeem(&claim(&f, index)).unwrap();
        }
        let first = f.ledger.list_claims(f.airdrop_id, None, Some(2)).unwrap();
        let keys: Vec<_> = first.items.iter().map(|c| c.claim_key.as_str()).collect();
        // keys sort as strings: "0x2222.." < "0x3333.." < "0xa11c.."
        assert_eq!(keys, vec![BOB, CAROL]);
        assert_eq!(first.next.as_deref(), Some(CAROL));

        let second = f
            .ledger
            .list_claims(f.airdrop_id, first.next.as_deref(), Some(2))
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].claim_key, ALICE);
        assert_eq!(second.next, None);
    }

    struct RecordingDisburser {
        fail: bool,
        seen: Mutex<Vec<ClaimAuthorization>>,
    }

    impl Disburser for RecordingDisburser {
        fn disburse(
            &self,
            authorization: &ClaimAuthorization,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            if self.fail {
                return Err("bank unavailable".into());
            }
            self.seen.lock().push(authorization.clone());
            Ok(())
        }
    }

    #[test]
    fn test_disburser_called_and_failure_rolls_back() {
        let f = open_fixture(600);
        let disburser = Arc::new(RecordingDisburser {
            fail: false,
            seen: Mutex::new(Vec::new()),
        });
        let ledger = ClaimLedger::with_disburser(f.ledger.registry().clone(), disburser.clone());
        ledger.redeem(&claim(&f, 0)).unwrap();
        assert_eq!(disburser.seen.lock().len(), 1);

        let failing = ClaimLedger::with_disburser(
            f.ledger.registry().clone(),
            Arc::new(RecordingDisburser {
                fail: true,
                seen: Mutex::new(Vec::new()),
            }),
        );
        assert_eq!(
            failing.redeem(&claim(&f, 1)),
            Err(AirdropError::DisbursementFailed("bank unavailable".to_string()))
        );
        assert!(!failing.is_claimed(f.airdrop_id, BOB).unwrap());
        assert_eq!(failing.registry().get(f.airdrop_id).unwrap().total_claimed, 100);
    }

    #[test]
    fn test_bearer_claim() {
        let signing_key = SigningKey::from_slice(&[11u8; 32]).unwrap();
        let registry = registry();
        let tree = tree();
        let airdrop = registry
            .create(NewAirdrop {
                kind: AirdropKind::Bearer,
                denom: "uluna".to_string(),
                merkle_root: tree.root(),
                total_amount: 600,
                creator: "creator".to_string(),
                label: Some("vouchers".to_string()),
                signer_pub: Some(signer_pub_bytes(&signing_key)),
            })
            .unwrap();
        let ledger = ClaimLedger::new(registry);

        let proof = tree.proof(1).unwrap();
        let assertion = ClaimAssertion {
            airdrop_id: airdrop.id,
            claim_key: "voucher-7",
            amount: "200",
            leaf: encode_leaf(BOB, "200").unwrap(),
            proof: &proof,
        };
        let signature = sign_assertion(&signing_key, &assertion).unwrap().to_vec();

        let request =
            ClaimRequest::bearer(airdrop.id, "voucher-7", BOB, "200", proof.clone(), signature)
                .with_beneficiary(CAROL);

        let mut forged = request.clone();
        forged.claim_key = Some("voucher-8".to_string());
        assert_eq!(ledger.redeem(&forged), Err(AirdropError::InvalidSignature));

        let mut unsigned = request.clone();
        unsigned.signature = None;
        assert_eq!(ledger.redeem(&unsigned), Err(AirdropError::InvalidSignature));

        let mut keyless = request.clone();
        keyless.claim_key = None;
        assert_eq!(ledger.redeem(&keyless), Err(AirdropError::MissingClaimKey));

        let authorization = ledger.redeem(&request).unwrap();
        assert_eq!(authorization.beneficiary, CAROL);
        assert_eq!(authorization.claim_key, "voucher-7");

        assert!(matches!(
            ledger.redeem(&request),
            Err(AirdropError::AlreadyClaimed { .. })
        ));
    }
}

//! Airdrop records: creation, lookup, paginated listing and closing.
//!
//! Registry-wide state (id counter, label and secondary indices) sits behind
//! one `RwLock`. Each record has its own `Mutex`, which is the per-airdrop
//! mutation lock the claim ledger serializes redemptions on.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bearer::parse_signer_pub;
use crate::clock::{Clock, SystemClock};
use crate::common::Hash;
use crate::config::{EngineConfig, ListingSettings};
use crate::error::{AirdropError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AirdropKind {
    /// Redemption bound to the recipient address in the leaf.
    Open,
    /// Redemption authorized by the creator's detached signature.
    Bearer,
}

/// One distribution campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Airdrop {
    pub id: u64,
    pub label: Option<String>,
    pub kind: AirdropKind,
    pub creator: String,
    pub denom: String,
    pub merkle_root: Hash,
    /// SEC1 public key, present only for bearer airdrops.
    pub signer_pub: Option<Vec<u8>>,
    pub total_amount: u128,
    pub total_claimed: u128,
    pub created_at: u64,
    pub closed_at: Option<u64>,
}

impl Airdrop {
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }

    pub fn remaining(&self) -> u128 {
        self.total_amount.saturating_sub(self.total_claimed)
    }
}

/// Parameters for [`AirdropRegistry::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAirdrop {
    pub kind: AirdropKind,
    pub denom: String,
    pub merkle_root: Hash,
    pub total_amount: u128,
    pub creator: String,
    pub label: Option<String>,
    pub signer_pub: Option<Vec<u8>>,
}

/// A redeemed leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub airdrop_id: u64,
    pub claim_key: String,
    pub beneficiary: String,
    pub amount: u128,
    pub claimed_at: u64,
}

/// An airdrop together with its claim records.
#[derive(Debug)]
pub(crate) struct AirdropRecord {
    pub(crate) airdrop: Airdrop,
    pub(crate) claims: BTreeMap<String, Claim>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListFilter {
    All,
    Creator(String),
    Kind(AirdropKind),
    /// Ordered by label rather than id; unlabeled airdrops never match.
    LabelPrefix(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

/// One page of a listing. `next` is the cursor to pass as `start_after`
/// for the following page, `None` on the last page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

#[derive(Debug, Default)]
struct RegistryState {
    next_id: u64,
    records: BTreeMap<u64, Arc<Mutex<AirdropRecord>>>,
    labels: BTreeMap<String, u64>,
    by_creator: BTreeSet<(String, u64)>,
    by_kind: BTreeSet<(AirdropKind, u64)>,
}

pub struct AirdropRegistry {
    state: RwLock<RegistryState>,
    clock: Arc<dyn Clock>,
    listing: ListingSettings,
}

impl Default for AirdropRegistry {
    fn default() -> Self {
        Self::new(&EngineConfig::default(), Arc::new(SystemClock))
    }
}

impl AirdropRegistry {
    pub fn new(config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                next_id: 1,
                ..RegistryState::default()
            }),
            clock,
            listing: config.listing.clone(),
        }
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Registers a new airdrop under the next sequential id.
    ///
    /// Validation happens before an id is taken, so a failed creation never
    /// consumes one.
    pub fn create(&self, params: NewAirdrop) -> Result<Airdrop> {
        match (params.kind, &params.signer_pub) {
            (AirdropKind::Bearer, None) => return Err(AirdropError::MissingSigner),
            (AirdropKind::Bearer, Some(signer_pub)) => {
                parse_signer_pub(signer_pub)?;
            }
            (AirdropKind::Open, Some(_)) => return Err(AirdropError::UnexpectedSigner),
            (AirdropKind::Open, None) => {}
        }
        if let Some(label) = &params.label {
            if label.trim().is_empty() {
                return Err(AirdropError::InvalidLabel("label must not be empty".into()));
            }
        }

        let mut state = self.state.write();
        if let Some(label) = &params.label {
            if state.labels.contains_key(label) {
                return Err(AirdropError::DuplicateLabel(label.clone()));
            }
        }

        let id = state.next_id;
        state.next_id += 1;

        let airdrop = Airdrop {
            id,
            label: params.label,
            kind: params.kind,
            creator: params.creator,
            denom: params.denom,
            merkle_root: params.merkle_root,
            signer_pub: params.signer_pub,
            total_amount: params.total_amount,
            total_claimed: 0,
            created_at: self.clock.now(),
            closed_at: None,
        };

        if let Some(label) = &airdrop.label {
            state.labels.insert(label.clone(), id);
        }
        state.by_creator.insert((airdrop.creator.clone(), id));
        state.by_kind.insert((airdrop.kind, id));
        state.records.insert(
            id,
            Arc::new(Mutex::new(AirdropRecord {
                airdrop: airdrop.clone(),
                claims: BTreeMap::new(),
            })),
        );

        info!(
            airdrop_id = id,
            kind = ?airdrop.kind,
            creator = %airdrop.creator,
            total_amount = %airdrop.total_amount,
            "airdrop created"
        );
        Ok(airdrop)
    }

    pub(crate) fn record(&self, id: u64) -> Result<Arc<Mutex<AirdropRecord>>> {
        self.state
            .read()
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| AirdropError::NotFound(format!("airdrop {id}")))
    }

    pub fn get(&self, id: u64) -> Result<Airdrop> {
        Ok(self.record(id)?.lock().airdrop.clone())
    }

    pub fn get_by_label(&self, label: &str) -> Result<Airdrop> {
        let id = self
            .state
            .read()
            .labels
            .get(label)
            .copied()
            .ok_or_else(|| AirdropError::NotFound(format!("label {label}")))?;
        self.get(id)
    }

    /// Closes an airdrop; only its creator may do so. Closing twice is a no-op.
    pub fn close(&self, id: u64, by: &str) -> Result<Airdrop> {
        let record = self.record(id)?;
        let mut record = record.lock();
        if record.airdrop.creator != by {
            return Err(AirdropError::Unauthorized(by.to_string(), id));
        }
        if record.airdrop.closed_at.is_none() {
            record.airdrop.closed_at = Some(self.clock.now());
            info!(airdrop_id = id, "airdrop closed");
        }
        Ok(record.airdrop.clone())
    }

    /// Resolves a requested page size against the configured bounds.
    pub(crate) fn page_limit(&self, limit: Option<u32>) -> Result<usize> {
        match limit {
            Some(0) => Err(AirdropError::InvalidLimit),
            Some(limit) => Ok(limit.min(self.listing.max_limit) as usize),
            None => Ok(self.listing.default_limit as usize),
        }
    }

    /// Paginated listing.
    ///
    /// `start_after` is the exclusive cursor returned as `Page::next`: an id
    /// for id-ordered filters, a label for `LabelPrefix`.
    pub fn list(
        &self,
        filter: &ListFilter,
        limit: Option<u32>,
        order: Order,
        start_after: Option<&str>,
    ) -> Result<Page<Airdrop>> {
        let limit = self.page_limit(limit)?;

        // records are locked only after the registry guard is released
        let (records, has_more) = {
            let state = self.state.read();
            let ids = Self::scan(&state, filter, order, start_after, limit + 1)?;
            let has_more = ids.len() > limit;
            let records: Vec<Arc<Mutex<AirdropRecord>>> = ids
                .into_iter()
                .take(limit)
                .filter_map(|id| state.records.get(&id).cloned())
                .collect();
            (records, has_more)
        };

        let items: Vec<Airdrop> = records
            .iter()
            .map(|record| record.lock().airdrop.clone())
            .collect();

        let next = match (has_more, items.last()) {
            (true, Some(last)) => match filter {
                ListFilter::LabelPrefix(_) => last.label.clone(),
                _ => Some(last.id.to_string()),
            },
            _ => None,
        };

        Ok(Page { items, next })
    }

    /// Ids matching `filter`, in `order`, starting after the cursor. Takes at
    /// most `take`; one more than the page size tells whether another page
    /// follows.
    fn scan(
        state: &RegistryState,
        filter: &ListFilter,
        order: Order,
        start_after: Option<&str>,
        take: usize,
    ) -> Result<Vec<u64>> {
        let ids = match filter {
            ListFilter::All => {
                let after = parse_id_cursor(start_after)?;
                scan_ids(&state.records, after, order, take)
            }
            ListFilter::Creator(creator) => {
                let after = parse_id_cursor(start_after)?;
                scan_index(&state.by_creator, creator, after, order, take)
            }
            ListFilter::Kind(kind) => {
                let after = parse_id_cursor(start_after)?;
                scan_index(&state.by_kind, kind, after, order, take)
            }
            ListFilter::LabelPrefix(prefix) => {
                scan_labels(&state.labels, prefix, start_after, order, take)
            }
        };
        Ok(ids)
    }
}

fn parse_id_cursor(start_after: Option<&str>) -> Result<Option<u64>> {
    start_after
        .map(|cursor| {
            cursor
                .parse::<u64>()
                .map_err(|_| AirdropError::InvalidCursor(cursor.to_string()))
        })
        .transpose()
}

fn scan_ids<V>(
    records: &BTreeMap<u64, V>,
    after: Option<u64>,
    order: Order,
    take: usize,
) -> Vec<u64> {
    let after = after.map_or(Bound::Unbounded, Bound::Excluded);
    match order {
        Order::Asc => records
            .range((after, Bound::Unbounded))
            .map(|(id, _)| *id)
            .take(take)
            .collect(),
        Order::Desc => records
            .range((Bound::Unbounded, after))
            .rev()
            .map(|(id, _)| *id)
            .take(take)
            .collect(),
    }
}

/// Range scan over a `(key, id)` secondary index.
fn scan_index<K: Ord + Clone>(
    index: &BTreeSet<(K, u64)>,
    key: &K,
    after: Option<u64>,
    order: Order,
    take: usize,
) -> Vec<u64> {
    let first = (key.clone(), u64::MIN);
    let last = (key.clone(), u64::MAX);
    match order {
        Order::Asc => {
            let lower = after.map_or(Bound::Included(first), |id| {
                Bound::Excluded((key.clone(), id))
            });
            index
                .range((lower, Bound::Included(last)))
                .map(|(_, id)| *id)
                .take(take)
                .collect()
        }
        Order::Desc => {
            let upper = after.map_or(Bound::Included(last), |id| {
                Bound::Excluded((key.clone(), id))
            });
            index
                .range((Bound::Included(first), upper))
                .rev()
                .map(|(_, id)| *id)
                .take(take)
                .collect()
        }
    }
}

/// Smallest string greater than every string starting with `prefix`, or
/// `None` when no such bound exists (empty prefix, or only `char::MAX`).
fn prefix_end(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        let next = (last as u32 + 1..=char::MAX as u32).find_map(char::from_u32);
        if let Some(next) = next {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

/// Range scan over the labels starting with `prefix`.
fn scan_labels(
    labels: &BTreeMap<String, u64>,
    prefix: &str,
    after: Option<&str>,
    order: Order,
    take: usize,
) -> Vec<u64> {
    let end = prefix_end(prefix);
    let family_end = || end.clone().map_or(Bound::Unbounded, Bound::Excluded);
    let past_family = |after: &str| end.as_deref().is_some_and(|end| after >= end);

    let (lower, upper) = match (order, after) {
        (Order::Asc, None) => (Bound::Included(prefix.to_string()), family_end()),
        (Order::Asc, Some(after)) if past_family(after) => return Vec::new(),
        (Order::Asc, Some(after)) if after >= prefix => {
            (Bound::Excluded(after.to_string()), family_end())
        }
        (Order::Asc, Some(_)) => (Bound::Included(prefix.to_string()), family_end()),
        // nothing carrying the prefix sorts below it
        (Order::Desc, Some(after)) if after <= prefix => return Vec::new(),
        (Order::Desc, Some(after)) if !past_family(after) => {
            (Bound::Included(prefix.to_string()), Bound::Excluded(after.to_string()))
        }
        (Order::Desc, _) => (Bound::Included(prefix.to_string()), family_end()),
    };

    let range = labels.range::<String, _>((lower, upper)).map(|(_, id)| *id);
    match order {
        Order::Asc => range.take(take).collect(),
        Order::Desc => range.rev().take(take).collect(),
    }
}

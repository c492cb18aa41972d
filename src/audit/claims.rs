//! Claim state machine and its storage table.
//!
//! ```text
//!            submit
//!              │
//!              ▼
//!          ┌────────┐  proof accepted   ┌───────────┐
//!          │Pending │──────────────────►│ Validated │
//!          └───┬────┘                   └───────────┘
//!              │ expiry height passed
//!              ▼
//!          ┌────────┐
//!          │Expired │
//!          └────────┘
//! ```

use crate::audit::oracle::AuditWindow;
use crate::error::{Error, Result};
use crate::merkle::{Hash32, MerkleRoot};
use crate::session::{Address, BlockHeight, ClaimKey, EvidenceType, SessionHeader};
use crate::store::{get_typed, put_typed, KvStore};
use serde::{Deserialize, Serialize};

/// Storage table prefix for claims.
pub(crate) const CLAIM_PREFIX: u8 = 0x01;

/// Storage table prefix for the pending-claim expiry index.
pub(crate) const PENDING_PREFIX: u8 = 0x03;

/// Commitment submitted by a servicer for one session's evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Session the evidence was produced in.
    pub header: SessionHeader,
    /// Kind of evidence committed to.
    pub evidence_type: EvidenceType,
    /// Merkle root over the evidence sequence.
    pub root: Hash32,
    /// Number of records under `root`.
    pub total_records: u64,
    /// Servicer submitting the claim.
    pub claimant: Address,
}

impl Claim {
    /// Build a claim from a computed root.
    #[must_use]
    pub fn from_root(
        header: SessionHeader,
        evidence_type: EvidenceType,
        root: MerkleRoot,
        claimant: Address,
    ) -> Self {
        Self {
            header,
            evidence_type,
            root: root.hash,
            total_records: root.count,
            claimant,
        }
    }

    /// Key under which the claim is stored.
    #[must_use]
    pub fn key(&self) -> ClaimKey {
        ClaimKey::new(self.claimant, self.header.clone(), self.evidence_type)
    }

    /// Check the claim's own fields.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClaimParameters` for an invalid header or a zero record count.
    pub fn validate_basic(&self) -> Result<()> {
        self.header.validate()?;
        if self.total_records == 0 {
            return Err(Error::InvalidClaimParameters(
                "total records must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lifecycle state of a stored claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimStatus {
    /// Waiting for its audit proof.
    Pending,
    /// Audit passed; a receipt was written.
    Validated,
    /// Audit window closed without a valid proof.
    Expired,
}

/// A claim as held in state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimEntry {
    /// The submitted claim.
    pub claim: Claim,
    /// Height at which the claim was accepted.
    pub submission_height: BlockHeight,
    /// Lookahead height fixed at submission.
    pub lookahead_height: BlockHeight,
    /// Expiry height fixed at submission.
    pub expiry_height: BlockHeight,
    /// Current state.
    pub status: ClaimStatus,
}

impl ClaimEntry {
    /// New pending entry.
    #[must_use]
    pub fn pending(claim: Claim, submission_height: BlockHeight, window: AuditWindow) -> Self {
        Self {
            claim,
            submission_height,
            lookahead_height: window.lookahead_height,
            expiry_height: window.expiry_height,
            status: ClaimStatus::Pending,
        }
    }

    /// Audit window fixed at submission.
    #[must_use]
    pub fn window(&self) -> AuditWindow {
        AuditWindow {
            lookahead_height: self.lookahead_height,
            expiry_height: self.expiry_height,
        }
    }

    /// Key of the claim.
    #[must_use]
    pub fn key(&self) -> ClaimKey {
        self.claim.key()
    }

    /// Status as seen at `height`: a pending claim past its expiry reads as expired.
    #[must_use]
    pub fn status_at(&self, height: BlockHeight) -> ClaimStatus {
        match self.status {
            ClaimStatus::Pending if self.window().is_expired_at(height) => ClaimStatus::Expired,
            status => status,
        }
    }

    /// Transition `Pending -> Validated`.
    ///
    /// # Errors
    ///
    /// Returns `ClaimAlreadySettled` from any other state.
    pub fn mark_validated(&mut self) -> Result<()> {
        self.transition(ClaimStatus::Validated)
    }

    /// Transition `Pending -> Expired`.
    ///
    /// # Errors
    ///
    /// Returns `ClaimAlreadySettled` from any other state.
    pub fn mark_expired(&mut self) -> Result<()> {
        self.transition(ClaimStatus::Expired)
    }

    fn transition(&mut self, to: ClaimStatus) -> Result<()> {
        if self.status != ClaimStatus::Pending {
            return Err(Error::ClaimAlreadySettled(format!(
                "{} is {:?}",
                self.key(),
                self.status
            )));
        }
        self.status = to;
        Ok(())
    }
}

pub(crate) fn claim_store_key(key: &ClaimKey) -> Vec<u8> {
    let mut buf = vec![CLAIM_PREFIX];
    key.encode_into(&mut buf);
    buf
}

/// Index entry of a pending claim: `prefix || expiry height BE || claim key`.
///
/// Sorting by expiry lets a sweep read only the claims that have lapsed.
fn pending_index_key(entry: &ClaimEntry) -> Vec<u8> {
    let mut buf = vec![PENDING_PREFIX];
    buf.extend_from_slice(&entry.expiry_height.to_be_bytes());
    entry.key().encode_into(&mut buf);
    buf
}

fn height_bound(height: BlockHeight) -> Vec<u8> {
    let mut buf = vec![PENDING_PREFIX];
    buf.extend_from_slice(&height.to_be_bytes());
    buf
}

/// Stored claim for `key`.
pub(crate) fn get_claim<S: KvStore + ?Sized>(store: &S, key: &ClaimKey) -> Result<Option<ClaimEntry>> {
    get_typed(store, &claim_store_key(key))
}

/// Store `entry` under its key, replacing any previous entry, and keep the
/// pending index in step with its status.
pub(crate) fn set_claim<S: KvStore + ?Sized>(store: &mut S, entry: &ClaimEntry) -> Result<()> {
    put_typed(store, claim_store_key(&entry.key()), entry)?;
    let index_key = pending_index_key(entry);
    if entry.status == ClaimStatus::Pending {
        store.set(index_key, Vec::new())
    } else {
        store.delete(&index_key)
    }
}

/// Every pending claim, in expiry order.
pub(crate) fn pending_claims<S: KvStore + ?Sized>(store: &S) -> Result<Vec<ClaimEntry>> {
    resolve_index(store, store.scan_prefix(&[PENDING_PREFIX])?)
}

/// Pending claims whose expiry height is below `height`, in expiry order.
pub(crate) fn lapsed_claims<S: KvStore + ?Sized>(
    store: &S,
    height: BlockHeight,
) -> Result<Vec<ClaimEntry>> {
    let entries = store.scan_range(&height_bound(0), &height_bound(height))?;
    resolve_index(store, entries)
}

fn resolve_index<S: KvStore + ?Sized>(
    store: &S,
    entries: Vec<(Vec<u8>, Vec<u8>)>,
) -> Result<Vec<ClaimEntry>> {
    const KEY_OFFSET: usize = 1 + std::mem::size_of::<BlockHeight>();

    entries
        .into_iter()
        .map(|(index_key, _)| {
            let encoded = index_key.get(KEY_OFFSET..).unwrap_or_default();
            let mut claim_key = Vec::with_capacity(1 + encoded.len());
            claim_key.push(CLAIM_PREFIX);
            claim_key.extend_from_slice(encoded);
            get_typed(store, &claim_key)?.ok_or_else(|| {
                Error::Storage(format!(
                    "pending index entry {} has no claim",
                    hex::encode(&index_key)
                ))
            })
        })
        .collect()
}

//! Audit keeper: claim submission, proof validation and receipt queries.
//!
//! This is the on-chain half of the pipeline. Every mutating call takes the
//! chain context explicitly, stages its writes in a [`StoreTxn`] and commits
//! only after all checks have passed.

use crate::audit::claims::{self, Claim, ClaimEntry, ClaimStatus};
use crate::audit::oracle::{self, AuditWindow};
use crate::audit::receipts::{self, Receipt};
use crate::chain::ChainContext;
use crate::error::{Error, Result};
use crate::event::{AuditEvent, AuditEventsChannel, AuditEventsSender};
use crate::evidence::RelayProof;
use crate::merkle::{self, MerkleProof};
use crate::session::{Address, ClaimKey, EvidenceType, SessionHeader};
use crate::store::{KvStore, StoreTxn};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Proof submitted in answer to a claim's audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofMsg {
    /// Claim being proved.
    pub key: ClaimKey,
    /// Revealed record.
    pub leaf: RelayProof,
    /// Inclusion proof for the record.
    pub proof: MerkleProof,
}

/// State-transition entry points for the claim and receipt ledgers.
pub struct AuditKeeper<S: KvStore> {
    store: S,
    events: Option<AuditEventsSender>,
}

impl<S: KvStore> AuditKeeper<S> {
    /// Create a keeper over `store`.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            events: None,
        }
    }

    /// Create a keeper that publishes [`AuditEvent`]s to `events`.
    #[must_use]
    pub fn with_events(store: S, events: AuditEventsSender) -> Self {
        Self {
            store,
            events: Some(events),
        }
    }

    /// Subscribe to events, if an event channel is attached.
    #[must_use]
    pub fn subscribe_events(&self) -> Option<AuditEventsChannel> {
        self.events.as_ref().map(AuditEventsSender::subscribe)
    }

    /// Underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consume the keeper and return its store.
    pub fn into_store(self) -> S {
        self.store
    }

    fn emit(&self, event: AuditEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Accept a claim.
    ///
    /// # Errors
    ///
    /// - `InvalidClaimParameters` if the claim is malformed or its session has not started
    /// - `DuplicateClaim` if a claim already exists for the same key
    /// - `SubmissionWindowClosed` if the lookahead block already exists
    pub fn submit_claim<C: ChainContext + ?Sized>(
        &mut self,
        ctx: &C,
        claim: Claim,
    ) -> Result<ClaimEntry> {
        claim.validate_basic()?;
        let key = claim.key();
        let current = ctx.current_height();

        if current < claim.header.session_start_height {
            return Err(Error::InvalidClaimParameters(format!(
                "session {} has not started (current height {current})",
                claim.header
            )));
        }

        if let Some(existing) = claims::get_claim(&self.store, &key)? {
            return Err(Error::DuplicateClaim(format!(
                "{key} already {:?}",
                existing.status_at(current)
            )));
        }

        let params = ctx.audit_params();
        params.validate()?;
        let window = AuditWindow::for_session(&params, &claim.header)?;
        if !window.accepts_claim_at(current) {
            return Err(Error::SubmissionWindowClosed {
                lookahead_height: window.lookahead_height,
                current_height: current,
            });
        }

        let entry = ClaimEntry::pending(claim, current, window);
        let mut txn = StoreTxn::new(&mut self.store);
        claims::set_claim(&mut txn, &entry)?;
        txn.commit()?;

        info!(
            "Claim {key} accepted: {} records, root {}, audit at height {}",
            entry.claim.total_records,
            hex::encode(entry.claim.root),
            window.lookahead_height
        );
        self.emit(AuditEvent::ClaimSubmitted {
            key,
            total_records: entry.claim.total_records,
            lookahead_height: window.lookahead_height,
        });
        Ok(entry)
    }

    /// Validate a proof against its pending claim and settle it into a receipt.
    ///
    /// The audit index is re-derived from the claim; the index declared in
    /// the proof is only accepted if it matches.
    ///
    /// # Errors
    ///
    /// - `ClaimNotFound` if no claim exists for the key
    /// - `ClaimAlreadySettled` if the claim is no longer pending
    /// - `AuditWindowNotYetOpen` / `ClaimExpired` outside the audit window
    /// - `FutureContextUnavailable` if the lookahead block cannot be read
    /// - `InvalidMerkleProof` if the proof does not reproduce the root
    /// - `RecordBindingMismatch` if the record belongs to another session or servicer
    /// - `DuplicateReceipt` if a receipt already exists for the key
    pub fn submit_proof<C: ChainContext + ?Sized>(
        &mut self,
        ctx: &C,
        msg: &ProofMsg,
    ) -> Result<Receipt> {
        let key = &msg.key;
        let mut entry = claims::get_claim(&self.store, key)?
            .ok_or_else(|| Error::ClaimNotFound(key.to_string()))?;
        if entry.status != ClaimStatus::Pending {
            return Err(Error::ClaimAlreadySettled(format!(
                "{key} is {:?}",
                entry.status
            )));
        }

        let current = ctx.current_height();
        entry.window().check_proof_at(current)?;

        let claim = &entry.claim;
        let index = oracle::index_at(
            ctx,
            entry.lookahead_height,
            &claim.header,
            claim.total_records,
        )?;

        merkle::check_proof(
            &msg.leaf.leaf_hash(),
            &msg.proof,
            &claim.root,
            claim.total_records,
            index,
        )?;
        msg.leaf
            .check_binding(&claim.header, &claim.claimant, claim.evidence_type)?;

        let receipt = Receipt {
            header: claim.header.clone(),
            servicer_address: claim.claimant,
            total: claim.total_records,
            evidence_type: claim.evidence_type,
        };
        entry.mark_validated()?;

        let mut txn = StoreTxn::new(&mut self.store);
        claims::set_claim(&mut txn, &entry)?;
        receipts::put_receipt(&mut txn, &receipt)?;
        txn.commit()?;

        info!(
            "Claim {key} validated at index {index}; receipt for {} records",
            receipt.total
        );
        self.emit(AuditEvent::ProofValidated {
            key: key.clone(),
            index,
        });
        self.emit(AuditEvent::ReceiptWritten {
            key: receipt.key(),
            total: receipt.total,
        });
        Ok(receipt)
    }

    /// Claim stored under `key`, with its status as seen at the current height.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn claim<C: ChainContext + ?Sized>(
        &self,
        ctx: &C,
        key: &ClaimKey,
    ) -> Result<Option<ClaimEntry>> {
        let current = ctx.current_height();
        Ok(claims::get_claim(&self.store, key)?.map(|mut entry| {
            entry.status = entry.status_at(current);
            entry
        }))
    }

    /// Every claim still stored as pending, earliest expiry first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn pending_claims(&self) -> Result<Vec<ClaimEntry>> {
        claims::pending_claims(&self.store)
    }

    /// Persist the `Expired` transition for every pending claim whose window
    /// has closed. Returns the keys that expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn sweep_expired_claims<C: ChainContext + ?Sized>(
        &mut self,
        ctx: &C,
    ) -> Result<Vec<ClaimKey>> {
        let current = ctx.current_height();
        let mut expired = Vec::new();

        let mut txn = StoreTxn::new(&mut self.store);
        for mut entry in claims::lapsed_claims(&txn, current)? {
            entry.mark_expired()?;
            claims::set_claim(&mut txn, &entry)?;
            expired.push(entry.key());
        }
        txn.commit()?;

        if !expired.is_empty() {
            warn!("{} claims expired at height {current}", expired.len());
        }
        for key in &expired {
            debug!("Claim {key} expired");
            self.emit(AuditEvent::ClaimExpired { key: key.clone() });
        }
        Ok(expired)
    }

    /// Receipt for `servicer`, `header` and `evidence_type`, if settled.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn receipt(
        &self,
        servicer: Address,
        header: &SessionHeader,
        evidence_type: EvidenceType,
    ) -> Result<Option<Receipt>> {
        receipts::get_receipt(
            &self.store,
            &ClaimKey::new(servicer, header.clone(), evidence_type),
        )
    }

    /// Every receipt of `servicer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn receipts_for_servicer(&self, servicer: &Address) -> Result<Vec<Receipt>> {
        receipts::receipts_for_servicer(&self.store, servicer)
    }

    /// Every receipt, for reward-epoch settlement.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn all_receipts(&self) -> Result<Vec<Receipt>> {
        receipts::all_receipts(&self.store)
    }

    /// Write several receipts at once; either all are written or none.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateReceipt` if any key already has a receipt, including
    /// a key repeated within `batch`.
    pub fn put_receipts(&mut self, batch: &[Receipt]) -> Result<()> {
        let mut txn = StoreTxn::new(&mut self.store);
        for receipt in batch {
            receipts::put_receipt(&mut txn, receipt)?;
        }
        txn.commit()?;
        debug!("Stored {} receipts", batch.len());
        Ok(())
    }
}

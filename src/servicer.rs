//! Servicer-side commit path.
//!
//! A servicer records every relay it serves, commits to a session's evidence
//! with a claim once the session ends, and answers the audit once the
//! lookahead block has been finalized.

use crate::audit::{self, Claim, ClaimEntry, ProofMsg};
use crate::chain::ChainContext;
use crate::error::{Error, Result};
use crate::evidence::{EvidenceLedger, RelayProof};
use crate::session::{Address, EvidenceKey, EvidenceType, SessionHeader};
use tracing::{debug, info};

/// Off-chain driver for one servicer's evidence.
#[derive(Clone)]
pub struct Servicer {
    address: Address,
    ledger: EvidenceLedger,
}

impl Servicer {
    /// Create a servicer recording into `ledger`.
    #[must_use]
    pub fn new(address: Address, ledger: EvidenceLedger) -> Self {
        Self { address, ledger }
    }

    /// Address of this servicer.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Evidence ledger backing this servicer.
    #[must_use]
    pub fn ledger(&self) -> &EvidenceLedger {
        &self.ledger
    }

    /// Record a served relay. Returns its index in the session's sequence.
    ///
    /// # Errors
    ///
    /// Returns `RecordBindingMismatch` if the record is malformed or names
    /// another servicer, and any error from [`EvidenceLedger::append`].
    pub fn record_relay(&self, record: RelayProof) -> Result<u64> {
        record.validate_basic()?;
        if record.servicer_address != self.address {
            return Err(Error::RecordBindingMismatch(format!(
                "record servicer {} is not {}",
                record.servicer_address, self.address
            )));
        }
        self.ledger.append(record)
    }

    /// Seal the evidence for `header` and `evidence_type` and build the claim
    /// committing to it.
    ///
    /// # Errors
    ///
    /// Returns `EvidenceNotFound` if no records were recorded.
    pub fn build_claim(&self, header: &SessionHeader, evidence_type: EvidenceType) -> Result<Claim> {
        let key = EvidenceKey::new(header.clone(), evidence_type);
        let evidence = self.ledger.seal(&key)?;
        let root = evidence.merkle_root()?;
        info!(
            "Built claim for {key}: {} records, root {}",
            root.count,
            root.hex()
        );
        Ok(Claim::from_root(
            header.clone(),
            evidence_type,
            root,
            self.address,
        ))
    }

    /// Produce the proof answering the audit of `entry`.
    ///
    /// # Errors
    ///
    /// Returns `FutureContextUnavailable` until the lookahead block is
    /// finalized, `EvidenceNotFound` if the evidence was already dropped, and
    /// `InvalidClaimParameters` if the claim does not belong to this servicer
    /// or no longer matches the held evidence.
    pub fn answer_audit<C: ChainContext + ?Sized>(
        &self,
        ctx: &C,
        entry: &ClaimEntry,
    ) -> Result<ProofMsg> {
        let claim = &entry.claim;
        if claim.claimant != self.address {
            return Err(Error::InvalidClaimParameters(format!(
                "claim {} belongs to another servicer",
                claim.key()
            )));
        }

        let key = EvidenceKey::new(claim.header.clone(), claim.evidence_type);
        let (index, (leaf, proof)) = self.ledger.with_evidence(&key, |evidence| {
            if evidence.len() != claim.total_records {
                return Err(Error::InvalidClaimParameters(format!(
                    "{key} holds {} records but the claim commits to {}",
                    evidence.len(),
                    claim.total_records
                )));
            }
            let index = audit::index_at(
                ctx,
                entry.lookahead_height,
                &claim.header,
                claim.total_records,
            )?;
            Ok((index, evidence.merkle_proof(index)?))
        })?;
        debug!("Answering audit of {key} with record {index}");
        Ok(ProofMsg {
            key: claim.key(),
            leaf,
            proof,
        })
    }

    /// Drop the evidence for a settled or expired session.
    pub fn release(&self, header: &SessionHeader, evidence_type: EvidenceType) -> bool {
        self.ledger
            .clear(&EvidenceKey::new(header.clone(), evidence_type))
    }
}

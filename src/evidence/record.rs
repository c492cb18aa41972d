//! Proof-of-service records, the leaves of a session's Merkle tree.

use crate::error::{Error, Result};
use crate::merkle::{self, Hash32};
use crate::session::{put_bytes, Address, BlockHeight, EvidenceType, SessionHeader};
use serde::{Deserialize, Serialize};

/// Domain tag mixed into every leaf encoding.
const RECORD_DOMAIN: &[u8] = b"relay-audit/record/v1";

/// One unit of proved service.
///
/// The record carries every field needed to bind it to exactly one session,
/// one servicer and one evidence type, so a leaf revealed during an audit
/// cannot be lifted from another claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelayProof {
    /// Hash binding the request to the response that was served.
    pub request_hash: Hash32,
    /// Client-chosen nonce keeping otherwise identical requests distinct.
    pub entropy: u64,
    /// Height at which the session started.
    pub session_start_height: BlockHeight,
    /// Servicer that did the work.
    pub servicer_address: Address,
    /// Hex-encoded public key of the application that was served.
    pub application_key: String,
    /// Identifier of the external chain the relay targeted.
    pub chain: String,
    /// Kind of evidence this record proves.
    pub evidence_type: EvidenceType,
    /// Client signature over the relay, verified by the transaction layer.
    pub signature: Vec<u8>,
}

impl RelayProof {
    /// Session this record was produced in.
    #[must_use]
    pub fn session_header(&self) -> SessionHeader {
        SessionHeader::new(
            self.application_key.clone(),
            self.chain.clone(),
            self.session_start_height,
        )
    }

    /// Deterministic byte encoding used for hashing.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            RECORD_DOMAIN.len() + 96 + self.application_key.len() + self.chain.len(),
        );
        buf.extend_from_slice(RECORD_DOMAIN);
        buf.extend_from_slice(&self.request_hash);
        buf.extend_from_slice(&self.entropy.to_be_bytes());
        buf.extend_from_slice(&self.session_start_height.to_be_bytes());
        buf.extend_from_slice(self.servicer_address.as_bytes());
        put_bytes(&mut buf, self.application_key.as_bytes());
        put_bytes(&mut buf, self.chain.as_bytes());
        buf.push(self.evidence_type.tag());
        put_bytes(&mut buf, &self.signature);
        buf
    }

    /// Leaf hash of this record.
    #[must_use]
    pub fn leaf_hash(&self) -> Hash32 {
        merkle::leaf_hash(&self.canonical_bytes())
    }

    /// Check that the record is structurally complete.
    ///
    /// # Errors
    ///
    /// Returns `RecordBindingMismatch` describing the first missing field.
    pub fn validate_basic(&self) -> Result<()> {
        if self.request_hash == [0u8; 32] {
            return Err(Error::RecordBindingMismatch(
                "record has empty request hash".to_string(),
            ));
        }
        if self.signature.is_empty() {
            return Err(Error::RecordBindingMismatch(
                "record has empty signature".to_string(),
            ));
        }
        self.session_header()
            .validate()
            .map_err(|e| Error::RecordBindingMismatch(e.to_string()))
    }

    /// Check that the record belongs to `header`, `servicer` and `evidence_type`.
    ///
    /// # Errors
    ///
    /// Returns `RecordBindingMismatch` naming the field that differs.
    pub fn check_binding(
        &self,
        header: &SessionHeader,
        servicer: &Address,
        evidence_type: EvidenceType,
    ) -> Result<()> {
        self.validate_basic()?;
        if self.session_header() != *header {
            return Err(Error::RecordBindingMismatch(format!(
                "record session {} does not match claim session {header}",
                self.session_header()
            )));
        }
        if self.servicer_address != *servicer {
            return Err(Error::RecordBindingMismatch(format!(
                "record servicer {} does not match claimant {servicer}",
                self.servicer_address
            )));
        }
        if self.evidence_type != evidence_type {
            return Err(Error::RecordBindingMismatch(format!(
                "record evidence type {} does not match claim evidence type {evidence_type}",
                self.evidence_type
            )));
        }
        Ok(())
    }
}

//! Error types for relay-audit.

use crate::session::BlockHeight;
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while committing, auditing or settling relay work.
///
/// Every variant is a per-transaction outcome. None of them is fatal to the
/// node process.
#[derive(Error, Debug)]
pub enum Error {
    /// No claim exists for the given key.
    #[error("claim not found: {0}")]
    ClaimNotFound(String),

    /// A live claim already exists for the given key.
    #[error("duplicate claim: {0}")]
    DuplicateClaim(String),

    /// The audit window for the claim has closed.
    #[error("claim expired at height {expiry_height} (current height {current_height})")]
    ClaimExpired {
        /// Last height at which a proof was accepted.
        expiry_height: BlockHeight,
        /// Height at which the proof was submitted.
        current_height: BlockHeight,
    },

    /// The claim already reached a terminal state.
    #[error("claim already settled: {0}")]
    ClaimAlreadySettled(String),

    /// The lookahead block has not been reached yet.
    #[error("audit window opens at height {lookahead_height} (current height {current_height})")]
    AuditWindowNotYetOpen {
        /// Height whose block entropy selects the audited leaf.
        lookahead_height: BlockHeight,
        /// Height at which the proof was submitted.
        current_height: BlockHeight,
    },

    /// The chain context at the requested height is not available yet.
    #[error("chain context unavailable at height {height}: {reason}")]
    FutureContextUnavailable {
        /// Requested height.
        height: BlockHeight,
        /// Accessor-provided reason.
        reason: String,
    },

    /// The inclusion proof does not recompute the committed root.
    #[error("invalid merkle proof: {0}")]
    InvalidMerkleProof(String),

    /// The revealed record does not belong to the claim's session or claimant.
    #[error("record binding mismatch: {0}")]
    RecordBindingMismatch(String),

    /// A receipt already exists for the given key.
    #[error("duplicate receipt: {0}")]
    DuplicateReceipt(String),

    /// The claim fields are out of range.
    #[error("invalid claim parameters: {0}")]
    InvalidClaimParameters(String),

    /// The lookahead block already exists, so the claim can no longer be submitted.
    #[error("claim submission closed at height {lookahead_height} (current height {current_height})")]
    SubmissionWindowClosed {
        /// Height whose block entropy selects the audited leaf.
        lookahead_height: BlockHeight,
        /// Height at which the claim was submitted.
        current_height: BlockHeight,
    },

    /// Evidence for the key was sealed by a claim.
    #[error("evidence sealed: {0}")]
    EvidenceSealed(String),

    /// Evidence for the key reached its record cap, or the ledger is full
    /// and cannot open a new session for it.
    #[error("evidence limit of {limit} reached for {key}")]
    EvidenceLimitReached {
        /// Evidence key.
        key: String,
        /// Configured records per session, or sessions per ledger.
        limit: usize,
    },

    /// No evidence is held for the key.
    #[error("evidence not found: {0}")]
    EvidenceNotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns true if the failure is a timing condition that resolves once
    /// the chain advances, rather than a fault in the submitted data.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::FutureContextUnavailable { .. } | Self::AuditWindowNotYetOpen { .. }
        )
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

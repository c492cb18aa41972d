//! Audit event system.
//!
//! Events are a best-effort notification sink. Nothing in the state
//! transitions depends on whether anyone is listening.

use crate::session::{BlockHeight, ClaimKey};
use tokio::sync::broadcast;

/// Events emitted by the audit keeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    /// A claim was accepted and is waiting for its proof.
    ClaimSubmitted {
        /// Claim key.
        key: ClaimKey,
        /// Committed record count.
        total_records: u64,
        /// Height from which a proof is accepted.
        lookahead_height: BlockHeight,
    },

    /// A proof passed the audit.
    ProofValidated {
        /// Claim key.
        key: ClaimKey,
        /// Leaf index that was audited.
        index: u64,
    },

    /// A receipt was written.
    ReceiptWritten {
        /// Receipt key.
        key: ClaimKey,
        /// Settled total.
        total: u64,
    },

    /// A pending claim lapsed without a valid proof.
    ClaimExpired {
        /// Claim key.
        key: ClaimKey,
    },
}

/// Channel for receiving audit events.
pub type AuditEventsChannel = broadcast::Receiver<AuditEvent>;

/// Sender for audit events.
pub type AuditEventsSender = broadcast::Sender<AuditEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (AuditEventsSender, AuditEventsChannel) {
    broadcast::channel(256)
}

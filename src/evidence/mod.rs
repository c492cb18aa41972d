//! Off-chain evidence accumulated while serving relays.
//!
//! Records are appended by the relay-serving path and later committed to by
//! a single Merkle root when the servicer submits its claim:
//!
//! ```text
//! relay served ──► EvidenceLedger::append ──► [r0, r1, r2, ...]
//!                                                   │
//!                         claim time: seal + merkle_root
//!                                                   │
//!                         audit time: merkle_proof(index)
//! ```

mod ledger;
mod record;

pub use ledger::{Evidence, EvidenceLedger, LedgerStats};
pub use record::RelayProof;

#[cfg(test)]
pub(crate) use record::tests::sample as sample_record;

//! On-chain audit of relay claims.
//!
//! A servicer commits to its evidence with a claim, then reveals one record
//! chosen by a block hash that did not exist when the claim was made:
//!
//! ```text
//! submit_claim (height < lookahead)
//!        │
//!        ▼
//! ┌─────────────────────┐
//! │ Claim: Pending      │
//! └─────────┬───────────┘
//!           │  lookahead block finalized
//!           ▼
//!  index = H(block hash, header, total) mod total
//!           │
//!    ┌──────┴──────────────┐
//!    │                     │
//! proof valid        expiry passed
//!    │                     │
//!    ▼                     ▼
//! Validated + Receipt   Expired
//! ```

mod claims;
mod keeper;
mod oracle;
mod receipts;

pub use claims::{Claim, ClaimEntry, ClaimStatus};
pub use keeper::{AuditKeeper, ProofMsg};
pub use oracle::{index_at, index_from_entropy, pseudorandom_index, AuditWindow};
pub use receipts::Receipt;

//! # relay-audit
//!
//! Commit, audit and settle relay work done by servicers without trusting
//! their self-reported totals.
//!
//! A servicer accumulates proof-of-service records during a session, commits
//! to them with a single Merkle root, and is later forced to reveal one
//! record chosen by a block hash that did not exist at commit time. Only if
//! that spot-check passes does the claim become a payable receipt.
//!
//! ## Architecture
//!
//! - [`evidence`]: per-session record accumulation (off-chain)
//! - [`merkle`]: root and inclusion-proof construction and verification
//! - [`audit`]: claim state machine, audit index oracle, proof validation
//!   and the receipt ledger (deterministic state transitions)
//! - [`servicer`]: the servicer's side of the pipeline
//! - [`chain`] and [`store`]: the chain-context and storage seams
//!
//! ## Example
//!
//! ```rust,no_run
//! use relay_audit::{
//!     AuditKeeper, AuditParams, ChainContext, EvidenceType, InMemoryChain, MemStore, Servicer,
//!     SessionHeader,
//! };
//!
//! # fn run(servicer: Servicer, header: SessionHeader) -> relay_audit::Result<()> {
//! let mut chain = InMemoryChain::new(AuditParams::default(), b"devnet");
//! let mut keeper = AuditKeeper::new(MemStore::new());
//!
//! let claim = servicer.build_claim(&header, EvidenceType::Relay)?;
//! let entry = keeper.submit_claim(&chain, claim)?;
//!
//! chain.advance_to(entry.lookahead_height);
//! let proof = servicer.answer_audit(&chain, &entry)?;
//! let receipt = keeper.submit_proof(&chain, &proof)?;
//! println!("settled {} relays at height {}", receipt.total, chain.current_height());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod audit;
pub mod chain;
pub mod config;
pub mod error;
pub mod event;
pub mod evidence;
pub mod merkle;
pub mod servicer;
pub mod session;
pub mod store;

pub use audit::{AuditKeeper, AuditWindow, Claim, ClaimEntry, ClaimStatus, ProofMsg, Receipt};
pub use chain::{BlockContext, ChainContext, InMemoryChain};
pub use config::{AuditConfig, AuditParams, EvidenceConfig};
pub use error::{Error, Result};
pub use event::{create_event_channel, AuditEvent, AuditEventsChannel, AuditEventsSender};
pub use evidence::{Evidence, EvidenceLedger, LedgerStats, RelayProof};
pub use merkle::{Hash32, MerkleProof, MerkleRoot, MerkleTree};
pub use servicer::Servicer;
pub use session::{Address, BlockHeight, ClaimKey, EvidenceKey, EvidenceType, SessionHeader};
pub use store::{KvStore, MemStore, StoreTxn};
